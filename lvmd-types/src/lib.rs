// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the lvmd node storage engine
//!
//! This crate defines the types shared by every layer of the stack:
//!
//! - **lvmd-sys**: Parses LVM reports into [`VolumeGroup`], [`LogicalVolume`]
//!   and [`ThinPool`] values
//! - **lvmd-service**: Resolves [`DeviceClass`] definitions, runs the capacity
//!   engine and serializes the request/response messages for D-Bus transport
//!
//! Everything here is pure data plus the LVM attribute decoder; nothing in
//! this crate touches the system.

pub mod api;
pub mod attr;
pub mod device_class;
pub mod error;
pub mod lvm;

pub use api::{
    CreateLvRequest, CreateLvResponse, CreateLvSnapshotRequest, CreateLvSnapshotResponse,
    GetFreeBytesRequest, GetFreeBytesResponse, GetLvListRequest, GetLvListResponse,
    LogicalVolumeInfo, RemoveLvRequest, RemoveLvResponse, ResizeLvRequest, ResizeLvResponse,
    ThinPoolItem, WatchItem, WatchResponse,
};
pub use attr::{AttrError, HealthError, LvAttr};
pub use device_class::{
    DEFAULT_DEVICE_CLASS_NAME, DEFAULT_SPARE_GB, DeviceClass, DeviceType, LvcreateOptionClass,
    ThinPoolConfig,
};
pub use error::{LvmdError, LvmdErrorKind};
pub use lvm::{
    Access, LogicalVolume, ThinPool, ThinPoolUsage, VolumeGroup, VolumeHealthError,
};

/// One GiB, the unit of the legacy `size_gb` request fields.
pub const GIB: u64 = 1 << 30;
