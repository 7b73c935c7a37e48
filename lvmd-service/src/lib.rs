// SPDX-License-Identifier: GPL-3.0-only

//! Node-local LVM storage engine
//!
//! Device classes map provisioning requests onto volume groups and thin
//! pools. [`LvService`] creates, resizes, snapshots and removes logical
//! volumes; [`VgService`] answers capacity queries and pushes capacity
//! snapshots to watchers after every change.

mod blocking;
pub mod capacity;
pub mod config;
pub mod device_class;
pub mod error;
pub mod lv_service;
pub mod notify;
pub mod transport;
pub mod vg_service;

#[cfg(test)]
mod testing;

pub use config::{BusKind, ConfigError, LvmdConfig};
pub use device_class::{DeviceClassManager, LvcreateOptionClassManager, ValidationError};
pub use error::{Result, ServiceError};
pub use lv_service::LvService;
pub use notify::{Notifier, Watchers};
pub use vg_service::{VgService, WatchSink};
