// SPDX-License-Identifier: GPL-3.0-only

//! Volume group, logical volume and thin pool operations
//!
//! [`LvmBackend`] is the seam the service layer programs against;
//! [`LvmTool`] implements it by running the `lvm` tool. Every mutation is
//! followed by a fresh query so returned values reflect what LVM actually
//! did (extent rounding, device numbers after activation).

use lvmd_types::{Access, LogicalVolume, ThinPool, ThinPoolUsage, VolumeGroup};
use tracing::{debug, info};

use crate::command::LvmCommand;
use crate::error::{Result, SysError};
use crate::report::{
    self, FullReportSection, LV_COLUMNS, LvRow, LvSection, Report, VG_COLUMNS, VgSection,
};

/// Parameters of a new thick or thin volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateVolume {
    pub name: String,

    /// Size in bytes (virtual size for thin volumes)
    pub size: u64,

    pub tags: Vec<String>,

    /// Stripe count, thick volumes only
    pub stripe: Option<u32>,

    /// Stripe size, thick volumes only
    pub stripe_size: Option<String>,

    /// Extra `lvcreate` flags, thick volumes only
    pub options: Vec<String>,
}

impl CreateVolume {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }
}

/// LVM state queries and mutations.
///
/// Values passed in are snapshots; implementations never assume they are
/// current and callers re-fetch after external changes.
pub trait LvmBackend: Send + Sync {
    /// Every volume group with its member cache populated, from one
    /// combined report.
    fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>>;

    /// Look up a single volume group. The member cache is left empty.
    fn find_volume_group(&self, name: &str) -> Result<VolumeGroup>;

    /// Re-fetch size, free space and (if it was populated) the member cache.
    fn refresh_volume_group(&self, vg: &mut VolumeGroup) -> Result<()>;

    /// Member volumes, served from the cache when present.
    fn list_volumes(&self, vg: &VolumeGroup) -> Result<Vec<LogicalVolume>>;

    fn find_volume(&self, vg: &VolumeGroup, name: &str) -> Result<LogicalVolume>;

    fn list_pools(&self, vg: &VolumeGroup) -> Result<Vec<ThinPool>> {
        Ok(self
            .list_volumes(vg)?
            .into_iter()
            .filter(LogicalVolume::is_thin_pool)
            .map(|lv| ThinPool { lv })
            .collect())
    }

    fn find_pool(&self, vg: &VolumeGroup, name: &str) -> Result<ThinPool> {
        let lv = self.find_volume(vg, name)?;
        if !lv.is_thin_pool() {
            return Err(SysError::NotFound(format!(
                "{} is not a thin pool",
                lv.full_name
            )));
        }
        Ok(ThinPool { lv })
    }

    /// Current data/metadata usage and allocated virtual size of a pool.
    fn pool_usage(&self, pool: &ThinPool) -> Result<ThinPoolUsage>;

    fn create_volume(&self, vg: &VolumeGroup, request: &CreateVolume) -> Result<LogicalVolume>;

    fn create_thin_volume(&self, pool: &ThinPool, request: &CreateVolume)
    -> Result<LogicalVolume>;

    /// Thin snapshot of `source`, created with the source's size.
    fn create_thin_snapshot(
        &self,
        source: &LogicalVolume,
        name: &str,
        tags: &[String],
    ) -> Result<LogicalVolume>;

    /// Resize to `size` bytes and update `lv` with the resulting size.
    fn resize_volume(&self, lv: &mut LogicalVolume, size: u64) -> Result<()>;

    fn rename_volume(&self, lv: &mut LogicalVolume, new_name: &str) -> Result<()>;

    fn activate_volume(&self, lv: &LogicalVolume, access: Access) -> Result<()>;

    fn remove_volume(&self, lv: &LogicalVolume) -> Result<()>;
}

/// [`LvmBackend`] that runs the `lvm` tool
#[derive(Debug, Clone, Default)]
pub struct LvmTool {
    command: LvmCommand,
}

impl LvmTool {
    pub fn new(command: LvmCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &LvmCommand {
        &self.command
    }

    fn vg_rows(&self, names: &[&str]) -> Result<Vec<VolumeGroup>> {
        let mut args = report::report_args();
        args.push("-o".to_string());
        args.push(VG_COLUMNS.to_string());
        args.extend(names.iter().map(|name| name.to_string()));

        let decoded: Report<VgSection> = self.command.call_json("vgs", &args)?;
        report::volume_groups(decoded)
    }

    /// `lvs` rows for a volume group or a single `vg/lv`.
    fn lv_rows(&self, target: &str) -> Result<Vec<LvRow>> {
        let mut args = report::report_args();
        args.push("-o".to_string());
        args.push(LV_COLUMNS.to_string());
        args.push(target.to_string());

        let decoded: Report<LvSection> = self.command.call_json("lvs", &args)?;
        let rows = report::lv_rows(decoded);
        debug!("lvs {target}: {} rows", rows.len());
        Ok(rows)
    }

    fn full_report(&self, names: &[&str]) -> Result<Vec<VolumeGroup>> {
        let mut args = report::fullreport_args();
        args.extend(names.iter().map(|name| name.to_string()));

        let decoded: Report<FullReportSection> = self.command.call_json("fullreport", &args)?;
        let groups = report::full_report(decoded)?;
        debug!("fullreport: {} volume groups", groups.len());
        Ok(groups)
    }

    fn query_volume(&self, vg_name: &str, name: &str) -> Result<LogicalVolume> {
        let full_name = format!("{vg_name}/{name}");
        let rows = self.lv_rows(&full_name)?;
        match rows.first() {
            Some(row) => row.to_logical_volume(),
            None => Err(SysError::NotFound(format!(
                "logical volume {full_name} not found"
            ))),
        }
    }
}

fn tag_args(tags: &[String]) -> impl Iterator<Item = String> + '_ {
    tags.iter()
        .flat_map(|tag| ["--addtag".to_string(), tag.clone()])
}

impl LvmBackend for LvmTool {
    fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>> {
        self.full_report(&[])
    }

    fn find_volume_group(&self, name: &str) -> Result<VolumeGroup> {
        self.vg_rows(&[name])?
            .into_iter()
            .find(|vg| vg.name == name)
            .ok_or_else(|| SysError::NotFound(format!("volume group {name} not found")))
    }

    fn refresh_volume_group(&self, vg: &mut VolumeGroup) -> Result<()> {
        let fresh = if vg.lv_cache.is_some() {
            self.full_report(&[&vg.name])?
                .into_iter()
                .find(|fresh| fresh.name == vg.name)
        } else {
            self.vg_rows(&[&vg.name])?
                .into_iter()
                .find(|fresh| fresh.name == vg.name)
        };

        match fresh {
            Some(fresh) => {
                vg.replace_with(fresh);
                Ok(())
            }
            None => Err(SysError::NotFound(format!(
                "volume group {} not found",
                vg.name
            ))),
        }
    }

    fn list_volumes(&self, vg: &VolumeGroup) -> Result<Vec<LogicalVolume>> {
        if let Some(cache) = &vg.lv_cache {
            return Ok(cache.values().cloned().collect());
        }
        report::logical_volumes(&self.lv_rows(&vg.name)?)
    }

    fn find_volume(&self, vg: &VolumeGroup, name: &str) -> Result<LogicalVolume> {
        if vg.lv_cache.is_some() {
            return vg.cached_volume(name).cloned().ok_or_else(|| {
                SysError::NotFound(format!("logical volume {}/{name} not found", vg.name))
            });
        }
        self.query_volume(&vg.name, name)
    }

    fn pool_usage(&self, pool: &ThinPool) -> Result<ThinPoolUsage> {
        let rows = self.lv_rows(pool.vg_name())?;
        let Some(pool_row) = rows.iter().find(|row| row.lv_name == pool.name()) else {
            return Err(SysError::NotFound(format!(
                "thin pool {} not found",
                pool.lv.full_name
            )));
        };

        let mut virtual_bytes = 0u64;
        for row in rows.iter().filter(|row| row.pool_lv == pool.name()) {
            virtual_bytes =
                virtual_bytes.saturating_add(report::parse_u64("lv_size", &row.lv_size)?);
        }

        Ok(ThinPoolUsage {
            data_percent: report::parse_percent("data_percent", &pool_row.data_percent)?,
            metadata_percent: report::parse_percent(
                "metadata_percent",
                &pool_row.metadata_percent,
            )?,
            virtual_bytes,
            size_bytes: report::parse_u64("lv_size", &pool_row.lv_size)?,
        })
    }

    fn create_volume(&self, vg: &VolumeGroup, request: &CreateVolume) -> Result<LogicalVolume> {
        let mut args = vec![
            "-n".to_string(),
            request.name.clone(),
            "-L".to_string(),
            format!("{}b", request.size),
            "-W".to_string(),
            "y".to_string(),
            "-y".to_string(),
        ];
        args.extend(tag_args(&request.tags));
        if let Some(stripe) = request.stripe {
            args.push("-i".to_string());
            args.push(stripe.to_string());
            if let Some(stripe_size) = &request.stripe_size {
                args.push("-I".to_string());
                args.push(stripe_size.clone());
            }
        }
        args.extend(request.options.iter().cloned());
        args.push(vg.name.clone());

        self.command.call("lvcreate", &args)?;
        info!("Created {}/{} ({} bytes)", vg.name, request.name, request.size);
        self.query_volume(&vg.name, &request.name)
    }

    fn create_thin_volume(
        &self,
        pool: &ThinPool,
        request: &CreateVolume,
    ) -> Result<LogicalVolume> {
        let mut args = vec![
            "-T".to_string(),
            pool.lv.full_name.clone(),
            "-n".to_string(),
            request.name.clone(),
            "-V".to_string(),
            format!("{}b", request.size),
            "-W".to_string(),
            "y".to_string(),
            "-y".to_string(),
        ];
        args.extend(tag_args(&request.tags));

        self.command.call("lvcreate", &args)?;
        info!(
            "Created thin volume {}/{} in {} ({} bytes)",
            pool.vg_name(),
            request.name,
            pool.name(),
            request.size
        );
        self.query_volume(pool.vg_name(), &request.name)
    }

    fn create_thin_snapshot(
        &self,
        source: &LogicalVolume,
        name: &str,
        tags: &[String],
    ) -> Result<LogicalVolume> {
        if !source.is_thin() {
            return Err(SysError::InvalidArgument(format!(
                "{} is not a thin volume",
                source.full_name
            )));
        }

        let mut args = vec![
            "-s".to_string(),
            "-k".to_string(),
            "n".to_string(),
            "-n".to_string(),
            name.to_string(),
        ];
        args.extend(tag_args(tags));
        args.push(source.full_name.clone());

        self.command.call("lvcreate", &args)?;
        info!("Created snapshot {}/{name} of {}", source.vg_name, source.name);
        self.query_volume(&source.vg_name, name)
    }

    fn resize_volume(&self, lv: &mut LogicalVolume, size: u64) -> Result<()> {
        let args = vec![
            "-L".to_string(),
            format!("{size}b"),
            lv.full_name.clone(),
        ];
        self.command.call("lvresize", &args)?;

        let fresh = self.query_volume(&lv.vg_name, &lv.name)?;
        info!("Resized {} to {} bytes", lv.full_name, fresh.size);
        *lv = fresh;
        Ok(())
    }

    fn rename_volume(&self, lv: &mut LogicalVolume, new_name: &str) -> Result<()> {
        let args = vec![lv.vg_name.clone(), lv.name.clone(), new_name.to_string()];
        self.command.call("lvrename", &args)?;
        info!("Renamed {} to {new_name}", lv.full_name);
        lv.rename_to(new_name);
        Ok(())
    }

    fn activate_volume(&self, lv: &LogicalVolume, access: Access) -> Result<()> {
        let mut args: Vec<String> = match access {
            Access::ReadOnly => vec!["-p".to_string(), "r".to_string()],
            Access::ReadWrite => vec![
                "-k".to_string(),
                "n".to_string(),
                "-a".to_string(),
                "y".to_string(),
            ],
        };
        args.push(lv.full_name.clone());
        self.command.call("lvchange", &args)?;
        debug!("Activated {} ({access})", lv.full_name);
        Ok(())
    }

    fn remove_volume(&self, lv: &LogicalVolume) -> Result<()> {
        let args = vec!["-f".to_string(), lv.full_name.clone()];
        self.command.call("lvremove", &args)?;
        info!("Removed {}", lv.full_name);
        Ok(())
    }
}
