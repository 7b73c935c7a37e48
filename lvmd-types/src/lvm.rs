// SPDX-License-Identifier: GPL-3.0-only

//! LVM (Logical Volume Manager) types
//!
//! Value snapshots of volume groups, logical volumes and thin pools as last
//! reported by the LVM tools. LVM state can change outside this process at
//! any time, so nothing here is kept in sync automatically: callers re-fetch
//! through the backend when they need current values.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attr::{AttrError, HealthError, LvAttr};

/// Volume group snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
    /// Volume group name
    pub name: String,

    /// Total size in bytes
    pub size: u64,

    /// Free space in bytes
    pub free: u64,

    /// Member logical volumes keyed by name, populated when the group came
    /// from a full report. `None` means the members were not fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lv_cache: Option<BTreeMap<String, LogicalVolume>>,
}

impl VolumeGroup {
    pub fn new(name: impl Into<String>, size: u64, free: u64) -> Self {
        Self {
            name: name.into(),
            size,
            free,
            lv_cache: None,
        }
    }

    /// Get used space in bytes
    pub fn used(&self) -> u64 {
        self.size.saturating_sub(self.free)
    }

    /// Cached member volume, if the cache is populated.
    pub fn cached_volume(&self, name: &str) -> Option<&LogicalVolume> {
        self.lv_cache.as_ref().and_then(|cache| cache.get(name))
    }

    /// Replace size, free space and member cache with a fresh snapshot.
    pub fn replace_with(&mut self, fresh: VolumeGroup) {
        self.size = fresh.size;
        self.free = fresh.free;
        self.lv_cache = fresh.lv_cache;
    }
}

/// Logical volume snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolume {
    /// Fully qualified name, `vg/lv`
    pub full_name: String,

    /// Bare logical volume name
    pub name: String,

    /// Device path, e.g. `/dev/vg0/lv0`
    pub path: String,

    /// Name of the owning volume group
    pub vg_name: String,

    /// Size in bytes. For a non-thin snapshot this is the origin's size.
    pub size: u64,

    /// Origin volume name, set for snapshots
    pub origin: Option<String>,

    /// Thin pool name, set for thin volumes
    pub pool: Option<String>,

    /// Kernel device major number, 0 when inactive
    pub dev_major: u32,

    /// Kernel device minor number, 0 when inactive
    pub dev_minor: u32,

    pub tags: BTreeSet<String>,

    /// Raw 10-character `lv_attr` string
    pub attr: String,
}

impl LogicalVolume {
    pub fn is_thin(&self) -> bool {
        self.pool.is_some()
    }

    pub fn is_snapshot(&self) -> bool {
        self.origin.is_some()
    }

    /// Thin pools are recognized purely by the first `lv_attr` flag.
    pub fn is_thin_pool(&self) -> bool {
        self.attr.starts_with('t')
    }

    pub fn decoded_attr(&self) -> Result<LvAttr, AttrError> {
        LvAttr::parse(&self.attr)
    }

    /// Decode the attribute string and check it for known failure states.
    pub fn verify_health(&self) -> Result<(), VolumeHealthError> {
        self.decoded_attr()?.verify_health()?;
        Ok(())
    }

    /// Re-derive the qualified name and device path after a rename.
    pub fn rename_to(&mut self, new_name: &str) {
        self.name = new_name.to_string();
        self.full_name = format!("{}/{}", self.vg_name, new_name);
        self.path = format!("/dev/{}/{}", self.vg_name, new_name);
    }
}

/// Failure from [`LogicalVolume::verify_health`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeHealthError {
    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error(transparent)]
    Unhealthy(#[from] HealthError),
}

/// Thin pool: the pool's own logical volume record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinPool {
    pub lv: LogicalVolume,
}

impl ThinPool {
    pub fn name(&self) -> &str {
        &self.lv.name
    }

    pub fn vg_name(&self) -> &str {
        &self.lv.vg_name
    }

    /// Raw pool data size in bytes
    pub fn size(&self) -> u64 {
        self.lv.size
    }
}

/// Thin pool usage, as reported by `lvs` at query time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinPoolUsage {
    /// Data space used, 0-100
    pub data_percent: f64,

    /// Metadata space used, 0-100
    pub metadata_percent: f64,

    /// Sum of the virtual sizes of every member thin volume
    pub virtual_bytes: u64,

    /// Raw pool data size in bytes
    pub size_bytes: u64,
}

impl ThinPoolUsage {
    /// Unallocated physical data space, ignoring overprovisioning.
    pub fn free_bytes(&self) -> u64 {
        let used = (self.size_bytes as f64 * self.data_percent / 100.0).ceil() as u64;
        self.size_bytes.saturating_sub(used)
    }
}

/// Activation access mode for snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    #[serde(rename = "ro")]
    ReadOnly,
    #[serde(rename = "rw")]
    ReadWrite,
}

impl FromStr for Access {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ro" => Ok(Self::ReadOnly),
            "rw" => Ok(Self::ReadWrite),
            other => Err(format!("unknown access type {other:?}, expected \"ro\" or \"rw\"")),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("ro"),
            Self::ReadWrite => f.write_str("rw"),
        }
    }
}
