// SPDX-License-Identifier: GPL-3.0-only

//! Capacity and overprovisioning arithmetic
//!
//! Everything here works on values already fetched from LVM.

use lvmd_types::{DeviceClass, ThinPoolConfig, ThinPoolUsage, VolumeGroup};

use crate::error::{Result, ServiceError};

/// Every volume size must be a multiple of this
pub const MINIMUM_SECTOR_SIZE: u64 = 512;

/// Reject sizes that are zero or not sector aligned.
pub fn check_size(size: u64) -> Result<()> {
    if size == 0 {
        return Err(ServiceError::InvalidArgument(
            "size must be greater than zero".to_string(),
        ));
    }
    if size % MINIMUM_SECTOR_SIZE != 0 {
        return Err(ServiceError::InvalidArgument(format!(
            "size {size} is not a multiple of {MINIMUM_SECTOR_SIZE} bytes"
        )));
    }
    Ok(())
}

/// Free bytes of a thick device class: volume group free space minus the
/// class's spare reservation.
pub fn thick_free_bytes(vg: &VolumeGroup, class: &DeviceClass) -> u64 {
    vg.free.saturating_sub(class.spare_bytes())
}

/// Virtual capacity of a pool: `floor(ratio * raw size)`.
pub fn virtual_pool_size(config: &ThinPoolConfig, usage: &ThinPoolUsage) -> u64 {
    (config.overprovision_ratio * usage.size_bytes as f64).floor() as u64
}

/// Free virtual bytes left after the member volumes' allocations.
pub fn overprovision_free_bytes(config: &ThinPoolConfig, usage: &ThinPoolUsage) -> u64 {
    virtual_pool_size(config, usage).saturating_sub(usage.virtual_bytes)
}

/// Free bytes of a thin device class. With overprovisioning skipped this is
/// the pool's unallocated physical space.
pub fn thin_free_bytes(config: &ThinPoolConfig, usage: &ThinPoolUsage) -> u64 {
    if config.skip_overprovisioning {
        usage.free_bytes()
    } else {
        overprovision_free_bytes(config, usage)
    }
}

/// Admission decision for growing storage by `requested` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub requested: u64,
    pub free: u64,

    /// Accept any request while some space is free
    pub any_free: bool,
}

impl Admission {
    pub fn thick(requested: u64, vg: &VolumeGroup, class: &DeviceClass) -> Self {
        Self {
            requested,
            free: thick_free_bytes(vg, class),
            any_free: false,
        }
    }

    pub fn thin(requested: u64, config: &ThinPoolConfig, usage: &ThinPoolUsage) -> Self {
        Self {
            requested,
            free: thin_free_bytes(config, usage),
            any_free: config.skip_overprovisioning,
        }
    }

    pub fn check(&self) -> Result<()> {
        let admitted = if self.any_free {
            self.free > 0
        } else {
            self.requested <= self.free
        };

        if admitted {
            Ok(())
        } else {
            Err(ServiceError::ResourceExhausted(format!(
                "requested {} bytes, {} bytes free",
                self.requested, self.free
            )))
        }
    }
}
