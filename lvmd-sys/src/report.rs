// SPDX-License-Identifier: GPL-3.0-only

//! JSON reports of `vgs`, `lvs` and `fullreport`
//!
//! LVM reports every column as a string, numbers included, so each row is
//! decoded as strings first and converted field by field.

use std::collections::{BTreeMap, BTreeSet};

use lvmd_types::{LogicalVolume, VolumeGroup};
use serde::Deserialize;

use crate::error::{Result, SysError};

/// Columns requested for volume groups
pub const VG_COLUMNS: &str = "vg_name,vg_size,vg_free";

/// Columns requested for logical volumes
pub const LV_COLUMNS: &str = "lv_name,lv_full_name,lv_path,vg_name,lv_size,origin,origin_size,\
pool_lv,lv_kernel_major,lv_kernel_minor,lv_tags,lv_attr,data_percent,metadata_percent";

/// Arguments shared by every report command
pub fn report_args() -> Vec<String> {
    ["--reportformat", "json", "--units", "b", "--nosuffix"]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

/// Arguments for `lvm fullreport` listing volume groups with their logical
/// volumes. The tool cannot omit a section, so the physical volume and
/// segment sections get the column list `,`, which selects no columns. A
/// bare `-o` would take the following argument as its value.
pub fn fullreport_args() -> Vec<String> {
    let mut args = report_args();
    for (section, columns) in [
        ("vg", VG_COLUMNS),
        ("lv", LV_COLUMNS),
        ("pv", ","),
        ("pvseg", ","),
        ("seg", ","),
    ] {
        args.push("--configreport".to_string());
        args.push(section.to_string());
        args.push(format!("-o{columns}"));
    }
    args
}

/// Top level of every JSON report
#[derive(Debug, Deserialize)]
pub struct Report<T> {
    #[serde(default = "Vec::new")]
    pub report: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct VgSection {
    #[serde(default)]
    pub vg: Vec<VgRow>,
}

#[derive(Debug, Deserialize)]
pub struct LvSection {
    #[serde(default)]
    pub lv: Vec<LvRow>,
}

/// One volume group of a `fullreport`
#[derive(Debug, Deserialize)]
pub struct FullReportSection {
    #[serde(default)]
    pub vg: Vec<VgRow>,
    #[serde(default)]
    pub lv: Vec<LvRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VgRow {
    pub vg_name: String,
    pub vg_size: String,
    pub vg_free: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LvRow {
    pub lv_name: String,
    pub lv_full_name: String,
    pub lv_path: String,
    pub vg_name: String,
    pub lv_size: String,
    pub origin: String,
    pub origin_size: String,
    pub pool_lv: String,
    pub lv_kernel_major: String,
    pub lv_kernel_minor: String,
    pub lv_tags: String,
    pub lv_attr: String,
    pub data_percent: String,
    pub metadata_percent: String,
}

pub fn parse_u64(field: &'static str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| SysError::Parse {
        field,
        value: value.to_string(),
    })
}

/// Kernel device numbers are `-1` for inactive volumes; that reads as 0.
pub fn parse_device_number(field: &'static str, value: &str) -> Result<u32> {
    let value = value.trim();
    if value.is_empty() || value == "-1" {
        return Ok(0);
    }
    value.parse().map_err(|_| SysError::Parse {
        field,
        value: value.to_string(),
    })
}

/// Percentages are empty for volumes that do not report them.
pub fn parse_percent(field: &'static str, value: &str) -> Result<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }
    value.parse().map_err(|_| SysError::Parse {
        field,
        value: value.to_string(),
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl VgRow {
    pub fn to_volume_group(&self) -> Result<VolumeGroup> {
        Ok(VolumeGroup::new(
            self.vg_name.clone(),
            parse_u64("vg_size", &self.vg_size)?,
            parse_u64("vg_free", &self.vg_free)?,
        ))
    }
}

impl LvRow {
    pub fn to_logical_volume(&self) -> Result<LogicalVolume> {
        let origin = non_empty(&self.origin);
        let pool = non_empty(&self.pool_lv);

        // lvs reports the COW size for old-style snapshots; callers expect the
        // size of the origin, as for every other volume.
        let size = if origin.is_some() && pool.is_none() {
            parse_u64("origin_size", &self.origin_size)?
        } else {
            parse_u64("lv_size", &self.lv_size)?
        };

        let full_name = if self.lv_full_name.is_empty() {
            format!("{}/{}", self.vg_name, self.lv_name)
        } else {
            self.lv_full_name.clone()
        };
        let path = if self.lv_path.is_empty() {
            format!("/dev/{full_name}")
        } else {
            self.lv_path.clone()
        };

        let tags: BTreeSet<String> = self
            .lv_tags
            .split(',')
            .filter_map(non_empty)
            .collect();

        Ok(LogicalVolume {
            full_name,
            name: self.lv_name.clone(),
            path,
            vg_name: self.vg_name.clone(),
            size,
            origin,
            pool,
            dev_major: parse_device_number("lv_kernel_major", &self.lv_kernel_major)?,
            dev_minor: parse_device_number("lv_kernel_minor", &self.lv_kernel_minor)?,
            tags,
            attr: self.lv_attr.clone(),
        })
    }
}

pub fn volume_groups(report: Report<VgSection>) -> Result<Vec<VolumeGroup>> {
    report
        .report
        .iter()
        .flat_map(|section| section.vg.iter())
        .map(VgRow::to_volume_group)
        .collect()
}

pub fn lv_rows(report: Report<LvSection>) -> Vec<LvRow> {
    report
        .report
        .into_iter()
        .flat_map(|section| section.lv)
        .collect()
}

pub fn logical_volumes(rows: &[LvRow]) -> Result<Vec<LogicalVolume>> {
    rows.iter().map(LvRow::to_logical_volume).collect()
}

/// Volume groups of a full report, each with its member cache populated.
pub fn full_report(report: Report<FullReportSection>) -> Result<Vec<VolumeGroup>> {
    let mut groups = Vec::new();
    for section in report.report {
        for vg_row in &section.vg {
            let mut vg = vg_row.to_volume_group()?;
            let mut cache = BTreeMap::new();
            for lv_row in &section.lv {
                let mut lv = lv_row.to_logical_volume()?;
                if lv.vg_name.is_empty() {
                    lv.vg_name = vg.name.clone();
                }
                if lv.vg_name == vg.name {
                    cache.insert(lv.name.clone(), lv);
                }
            }
            vg.lv_cache = Some(cache);
            groups.push(vg);
        }
    }
    Ok(groups)
}
