// SPDX-License-Identifier: GPL-3.0-only

//! Request and response messages of the remote surface.
//!
//! Every sizing request accepts both the legacy `size_gb` field (whole GiB)
//! and the exact `size_bytes` field; a non-zero `size_bytes` wins.

use serde::{Deserialize, Serialize};

use crate::GIB;
use crate::lvm::LogicalVolume;

fn requested_bytes(size_bytes: u64, size_gb: u64) -> u64 {
    if size_bytes > 0 {
        size_bytes
    } else {
        size_gb.saturating_mul(GIB)
    }
}

/// Logical volume as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolumeInfo {
    pub name: String,
    pub size_bytes: u64,
    pub dev_major: u32,
    pub dev_minor: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub attr: String,
}

impl From<&LogicalVolume> for LogicalVolumeInfo {
    fn from(lv: &LogicalVolume) -> Self {
        Self {
            name: lv.name.clone(),
            size_bytes: lv.size,
            dev_major: lv.dev_major,
            dev_minor: lv.dev_minor,
            tags: lv.tags.iter().cloned().collect(),
            path: lv.path.clone(),
            attr: lv.attr.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLvRequest {
    pub name: String,
    #[serde(default)]
    pub device_class: String,
    #[serde(default)]
    pub size_gb: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lvcreate_option_class: String,
}

impl CreateLvRequest {
    pub fn requested_bytes(&self) -> u64 {
        requested_bytes(self.size_bytes, self.size_gb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLvResponse {
    pub volume: LogicalVolumeInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLvRequest {
    pub name: String,
    #[serde(default)]
    pub device_class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLvResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeLvRequest {
    pub name: String,
    #[serde(default)]
    pub device_class: String,
    #[serde(default)]
    pub size_gb: u64,
    #[serde(default)]
    pub size_bytes: u64,
}

impl ResizeLvRequest {
    pub fn requested_bytes(&self) -> u64 {
        requested_bytes(self.size_bytes, self.size_gb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeLvResponse {
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLvSnapshotRequest {
    pub name: String,
    #[serde(default)]
    pub device_class: String,
    pub source_volume: String,
    #[serde(default)]
    pub size_gb: u64,
    #[serde(default)]
    pub size_bytes: u64,
    /// `ro` or `rw`
    pub access_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateLvSnapshotRequest {
    /// Requested size, 0 when unspecified
    pub fn requested_bytes(&self) -> u64 {
        requested_bytes(self.size_bytes, self.size_gb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLvSnapshotResponse {
    pub snapshot: LogicalVolumeInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLvListRequest {
    #[serde(default)]
    pub device_class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLvListResponse {
    pub volumes: Vec<LogicalVolumeInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFreeBytesRequest {
    #[serde(default)]
    pub device_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFreeBytesResponse {
    pub free_bytes: u64,
}

/// Thin pool part of a capacity snapshot item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinPoolItem {
    pub data_percent: f64,
    pub metadata_percent: f64,
    /// Raw pool data size
    pub size_bytes: u64,
    /// Free virtual capacity after overprovisioning
    pub overprovision_bytes: u64,
}

/// Capacity of one device class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchItem {
    pub device_class: String,
    pub free_bytes: u64,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thin_pool: Option<ThinPoolItem>,
}

/// Full capacity snapshot pushed to watchers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchResponse {
    /// Free bytes of the default device class, 0 without one
    pub free_bytes: u64,
    pub items: Vec<WatchItem>,
}

impl WatchResponse {
    pub fn item(&self, device_class: &str) -> Option<&WatchItem> {
        self.items
            .iter()
            .find(|item| item.device_class == device_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_bytes_takes_precedence_over_size_gb() {
        let request = CreateLvRequest {
            name: "lv".to_string(),
            size_gb: 2,
            size_bytes: 4096,
            ..Default::default()
        };
        assert_eq!(request.requested_bytes(), 4096);

        let request = ResizeLvRequest {
            name: "lv".to_string(),
            size_gb: 2,
            ..Default::default()
        };
        assert_eq!(request.requested_bytes(), 2 * GIB);
    }

    #[test]
    fn unspecified_snapshot_size_is_zero() {
        let request = CreateLvSnapshotRequest {
            name: "snap".to_string(),
            source_volume: "lv".to_string(),
            access_type: "ro".to_string(),
            ..Default::default()
        };
        assert_eq!(request.requested_bytes(), 0);
    }

    #[test]
    fn create_request_accepts_minimal_json() {
        let request: CreateLvRequest =
            serde_json::from_str(r#"{"name":"lv","size_bytes":1073741824}"#).expect("parse");
        assert_eq!(request.device_class, "");
        assert!(request.tags.is_empty());
        assert_eq!(request.requested_bytes(), GIB);
    }
}
