// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus transport

pub mod lvm;

pub use lvm::{
    LV_OBJECT_PATH, LvHandler, SERVICE_NAME, VG_OBJECT_PATH, VgHandler, monitor_capacity,
};
