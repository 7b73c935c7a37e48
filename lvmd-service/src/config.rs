// SPDX-License-Identifier: GPL-3.0-only

//! Daemon configuration
//!
//! Loaded once from a TOML file at startup; every device class and option
//! class is validated before the service starts.

use std::fs;
use std::path::{Path, PathBuf};

use lvmd_sys::{LvmCommand, SysError};
use lvmd_types::{DeviceClass, LvcreateOptionClass};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device_class::{DeviceClassManager, LvcreateOptionClassManager, ValidationError};

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lvmd/lvmd.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid lvm-command-prefix: {0}")]
    Command(#[from] SysError),
}

/// Bus the service registers on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LvmdConfig {
    /// Program and leading arguments used to run `lvm`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lvm_command_prefix: Vec<String>,

    #[serde(default)]
    pub bus: BusKind,

    pub device_classes: Vec<DeviceClass>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lvcreate_option_classes: Vec<LvcreateOptionClass>,
}

impl LvmdConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    pub fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `lvm` invocation; the bare binary unless a prefix is configured.
    pub fn lvm_command(&self) -> Result<LvmCommand, ConfigError> {
        if self.lvm_command_prefix.is_empty() {
            return Ok(LvmCommand::default());
        }
        Ok(LvmCommand::new(self.lvm_command_prefix.clone())?)
    }

    pub fn device_class_manager(&self) -> Result<DeviceClassManager, ConfigError> {
        Ok(DeviceClassManager::new(self.device_classes.clone())?)
    }

    pub fn option_class_manager(&self) -> Result<LvcreateOptionClassManager, ConfigError> {
        Ok(LvcreateOptionClassManager::new(
            self.lvcreate_option_classes.clone(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        lvm-command-prefix = ["/usr/bin/nsenter", "-m", "-t", "1", "/sbin/lvm"]
        bus = "session"

        [[device-classes]]
        name = "ssd"
        volume-group = "node-vg"
        default = true
        spare-gb = 10
        lvcreate-options = ["--type=raid1"]

        [[device-classes]]
        name = "thin"
        volume-group = "node-vg"
        type = "thin"
        [device-classes.thin-pool]
        name = "pool0"
        overprovision-ratio = 5.0

        [[lvcreate-option-classes]]
        name = "raid1"
        options = ["--type=raid1"]
    "#;

    #[test]
    fn parses_full_configuration() {
        let config = LvmdConfig::parse(Path::new("lvmd.toml"), CONFIG).expect("parse");
        assert_eq!(config.bus, BusKind::Session);
        assert_eq!(config.device_classes.len(), 2);
        assert_eq!(config.lvcreate_option_classes[0].name, "raid1");
        assert_eq!(
            config.lvm_command().expect("command").prefix()[0],
            "/usr/bin/nsenter"
        );

        let classes = config.device_class_manager().expect("valid classes");
        assert_eq!(classes.device_class("").expect("default").name, "ssd");
        assert!(
            config
                .option_class_manager()
                .expect("valid option classes")
                .option_class("raid1")
                .is_some()
        );
    }

    #[test]
    fn defaults_to_system_bus_and_plain_lvm() {
        let raw = r#"
            [[device-classes]]
            name = "ssd"
            volume-group = "vg"
        "#;
        let config = LvmdConfig::parse(Path::new("lvmd.toml"), raw).expect("parse");
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.lvm_command().expect("command"), LvmCommand::default());
    }

    #[test]
    fn validation_errors_surface() {
        let raw = r#"
            [[device-classes]]
            name = "thin"
            volume-group = "vg"
            type = "thin"
        "#;
        let config = LvmdConfig::parse(Path::new("lvmd.toml"), raw).expect("parse");
        assert!(matches!(
            config.device_class_manager(),
            Err(ConfigError::Validation(ValidationError::MissingThinPool(_)))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let error = LvmdConfig::load(Path::new("/nonexistent/lvmd.toml")).expect_err("missing");
        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
