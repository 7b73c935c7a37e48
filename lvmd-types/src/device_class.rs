// SPDX-License-Identifier: GPL-3.0-only

//! Device class definitions
//!
//! A device class binds a provisioning request to a concrete volume group
//! (thick) or volume group + thin pool pair (thin). Definitions are loaded
//! from the daemon configuration and validated once at startup.

use serde::{Deserialize, Serialize};

use crate::GIB;

/// Name that selects the default device class.
pub const DEFAULT_DEVICE_CLASS_NAME: &str = "";

/// Spare capacity reserved per device class unless overridden.
pub const DEFAULT_SPARE_GB: u64 = 10;

/// Device class target kind. An empty `type` in the configuration is thick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    #[default]
    #[serde(rename = "thick", alias = "")]
    Thick,
    #[serde(rename = "thin")]
    Thin,
}

/// Thin pool settings for a thin device class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThinPoolConfig {
    /// Thin pool name inside the volume group
    pub name: String,

    /// Multiplier applied to the raw pool size, at least 1.0
    pub overprovision_ratio: f64,

    /// Report raw free pool space instead of overprovisioned capacity
    #[serde(default)]
    pub skip_overprovisioning: bool,
}

/// Device class definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceClass {
    pub name: String,

    /// Target volume group name
    pub volume_group: String,

    /// Whether this class answers requests for the default class
    #[serde(default)]
    pub default: bool,

    /// Reserved spare capacity in GiB; defaults to [`DEFAULT_SPARE_GB`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spare_gb: Option<u64>,

    /// Number of stripes for thick volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe: Option<u32>,

    /// Stripe size passed to `lvcreate -I`, e.g. `4k`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_size: Option<String>,

    /// Extra `lvcreate` flags for every thick volume of this class
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lvcreate_options: Vec<String>,

    #[serde(default, rename = "type")]
    pub device_type: DeviceType,

    /// Required when `device_type` is thin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thin_pool: Option<ThinPoolConfig>,
}

impl DeviceClass {
    /// Thick device class with default settings.
    pub fn thick(name: impl Into<String>, volume_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume_group: volume_group.into(),
            default: false,
            spare_gb: None,
            stripe: None,
            stripe_size: None,
            lvcreate_options: Vec::new(),
            device_type: DeviceType::Thick,
            thin_pool: None,
        }
    }

    /// Thin device class backed by `pool` with the given overprovision ratio.
    pub fn thin(
        name: impl Into<String>,
        volume_group: impl Into<String>,
        pool: impl Into<String>,
        overprovision_ratio: f64,
    ) -> Self {
        Self {
            device_type: DeviceType::Thin,
            thin_pool: Some(ThinPoolConfig {
                name: pool.into(),
                overprovision_ratio,
                skip_overprovisioning: false,
            }),
            ..Self::thick(name, volume_group)
        }
    }

    pub fn is_thin(&self) -> bool {
        self.device_type == DeviceType::Thin
    }

    /// Reserved spare capacity in bytes
    pub fn spare_bytes(&self) -> u64 {
        self.spare_gb.unwrap_or(DEFAULT_SPARE_GB).saturating_mul(GIB)
    }

    /// Thin pool name, when this is a thin class
    pub fn pool_name(&self) -> Option<&str> {
        self.thin_pool.as_ref().map(|pool| pool.name.as_str())
    }
}

/// Named bundle of extra `lvcreate` flags, selectable per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LvcreateOptionClass {
    pub name: String,
    pub options: Vec<String>,
}
