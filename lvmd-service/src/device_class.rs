// SPDX-License-Identifier: GPL-3.0-only

//! Device class resolution
//!
//! Device classes are validated once at startup and indexed three ways: by
//! name, by volume group (thick classes) and by volume group + thin pool
//! (thin classes). The managers are immutable afterwards and shared freely
//! between concurrent calls.

use std::collections::{HashMap, HashSet};

use lvmd_types::{DEFAULT_DEVICE_CLASS_NAME, DeviceClass, LvcreateOptionClass};
use thiserror::Error;

use crate::error::ServiceError;

/// Longest accepted device class name
pub const MAX_NAME_LEN: usize = 63;

/// Rejected device class or option class configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no device classes configured")]
    Empty,

    #[error("invalid device class name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("device class {0:?} has no volume group")]
    MissingVolumeGroup(String),

    #[error("both {0:?} and {1:?} are marked as the default device class")]
    MultipleDefaults(String, String),

    #[error("duplicate device class name {0:?}")]
    DuplicateName(String),

    #[error("thin device class {0:?} has no thin pool configuration")]
    MissingThinPool(String),

    #[error("thin device class {0:?} has no thin pool name")]
    MissingPoolName(String),

    #[error("overprovision ratio of device class {name:?} must be at least 1.0, got {ratio}")]
    OverprovisionRatio { name: String, ratio: f64 },

    #[error("device classes {first:?} and {second:?} both target {target}")]
    DuplicateTarget {
        first: String,
        second: String,
        target: String,
    },

    #[error("lvcreate option class name must not be empty")]
    EmptyOptionClassName,

    #[error("duplicate lvcreate option class name {0:?}")]
    DuplicateOptionClass(String),
}

/// Check a name against `^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$`.
fn validate_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 63 characters"));
    }

    let bytes = name.as_bytes();
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid("name must start and end with an alphanumeric character"));
    }
    if !bytes
        .iter()
        .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'))
    {
        return Err(invalid(
            "name may only contain alphanumerics, '-', '_' and '.'",
        ));
    }
    Ok(())
}

fn target_of(class: &DeviceClass) -> (String, Option<String>) {
    (
        class.volume_group.clone(),
        class
            .pool_name()
            .filter(|_| class.is_thin())
            .map(str::to_string),
    )
}

/// Validate a device class list before it is indexed.
pub fn validate_device_classes(classes: &[DeviceClass]) -> Result<(), ValidationError> {
    if classes.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut names: HashSet<&str> = HashSet::new();
    let mut targets: HashMap<(String, Option<String>), &str> = HashMap::new();
    let mut default: Option<&str> = None;

    for class in classes {
        validate_name(&class.name)?;

        if class.volume_group.is_empty() {
            return Err(ValidationError::MissingVolumeGroup(class.name.clone()));
        }

        if class.default {
            if let Some(previous) = default {
                return Err(ValidationError::MultipleDefaults(
                    previous.to_string(),
                    class.name.clone(),
                ));
            }
            default = Some(&class.name);
        }

        if !names.insert(&class.name) {
            return Err(ValidationError::DuplicateName(class.name.clone()));
        }

        if class.is_thin() {
            let Some(pool) = &class.thin_pool else {
                return Err(ValidationError::MissingThinPool(class.name.clone()));
            };
            if pool.name.is_empty() {
                return Err(ValidationError::MissingPoolName(class.name.clone()));
            }
            if pool.overprovision_ratio.is_nan() || pool.overprovision_ratio < 1.0 {
                return Err(ValidationError::OverprovisionRatio {
                    name: class.name.clone(),
                    ratio: pool.overprovision_ratio,
                });
            }
        }

        let target = target_of(class);
        if let Some(first) = targets.get(&target) {
            let described = match &target.1 {
                Some(pool) => format!("thin pool {}/{pool}", target.0),
                None => format!("volume group {}", target.0),
            };
            return Err(ValidationError::DuplicateTarget {
                first: first.to_string(),
                second: class.name.clone(),
                target: described,
            });
        }
        targets.insert(target, &class.name);
    }

    Ok(())
}

/// Validated, indexed device classes
#[derive(Debug, Clone)]
pub struct DeviceClassManager {
    classes: Vec<DeviceClass>,
    by_name: HashMap<String, usize>,
    by_volume_group: HashMap<String, usize>,
    by_thin_pool: HashMap<(String, String), usize>,
    default: Option<usize>,
}

impl DeviceClassManager {
    pub fn new(classes: Vec<DeviceClass>) -> Result<Self, ValidationError> {
        validate_device_classes(&classes)?;

        let mut by_name = HashMap::new();
        let mut by_volume_group = HashMap::new();
        let mut by_thin_pool = HashMap::new();
        let mut default = None;

        for (index, class) in classes.iter().enumerate() {
            by_name.insert(class.name.clone(), index);
            match class.pool_name() {
                Some(pool) if class.is_thin() => {
                    by_thin_pool.insert((class.volume_group.clone(), pool.to_string()), index);
                }
                _ => {
                    by_volume_group.insert(class.volume_group.clone(), index);
                }
            }
            if class.default {
                default = Some(index);
            }
        }

        Ok(Self {
            classes,
            by_name,
            by_volume_group,
            by_thin_pool,
            default,
        })
    }

    /// Resolve a class by name; the empty name selects the default class.
    pub fn device_class(&self, name: &str) -> Result<&DeviceClass, ServiceError> {
        let index = if name == DEFAULT_DEVICE_CLASS_NAME {
            self.default
        } else {
            self.by_name.get(name).copied()
        };

        index.map(|index| &self.classes[index]).ok_or_else(|| {
            if name == DEFAULT_DEVICE_CLASS_NAME {
                ServiceError::NotFound("no default device class is configured".to_string())
            } else {
                ServiceError::NotFound(format!("device class {name:?} not found"))
            }
        })
    }

    /// Thick class targeting `volume_group`
    pub fn for_volume_group(&self, volume_group: &str) -> Option<&DeviceClass> {
        self.by_volume_group
            .get(volume_group)
            .map(|index| &self.classes[*index])
    }

    /// Thin class targeting `pool` in `volume_group`
    pub fn for_thin_pool(&self, volume_group: &str, pool: &str) -> Option<&DeviceClass> {
        self.by_thin_pool
            .get(&(volume_group.to_string(), pool.to_string()))
            .map(|index| &self.classes[*index])
    }

    pub fn default_class(&self) -> Option<&DeviceClass> {
        self.default.map(|index| &self.classes[index])
    }

    /// All classes in configuration order
    pub fn classes(&self) -> &[DeviceClass] {
        &self.classes
    }
}

/// Named `lvcreate` option bundles
#[derive(Debug, Clone, Default)]
pub struct LvcreateOptionClassManager {
    classes: HashMap<String, LvcreateOptionClass>,
}

impl LvcreateOptionClassManager {
    pub fn new(classes: Vec<LvcreateOptionClass>) -> Result<Self, ValidationError> {
        let mut indexed = HashMap::new();
        for class in classes {
            if class.name.is_empty() {
                return Err(ValidationError::EmptyOptionClassName);
            }
            if indexed.contains_key(&class.name) {
                return Err(ValidationError::DuplicateOptionClass(class.name));
            }
            indexed.insert(class.name.clone(), class);
        }
        Ok(Self { classes: indexed })
    }

    pub fn option_class(&self, name: &str) -> Option<&LvcreateOptionClass> {
        self.classes.get(name)
    }
}
