// SPDX-License-Identifier: GPL-3.0-only

//! In-memory LVM for service tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use lvmd_sys::{CommandError, CreateVolume, LvmBackend, Result, SysError};
use lvmd_types::{Access, LogicalVolume, ThinPool, ThinPoolUsage, VolumeGroup};

#[derive(Default)]
struct FakeGroup {
    size: u64,
    free: u64,
    volumes: BTreeMap<String, LogicalVolume>,
    data_percent: BTreeMap<String, f64>,
}

#[derive(Default)]
struct FakeState {
    groups: BTreeMap<String, FakeGroup>,
    calls: Vec<String>,
    fail_activation: bool,
    failing_reports: usize,
    next_minor: u32,
}

/// Backend keeping volume groups in memory and recording every call as
/// `<command> <target>`.
#[derive(Default)]
pub struct FakeLvm {
    state: Mutex<FakeState>,
}

fn volume(vg: &str, name: &str, size: u64, attr: &str) -> LogicalVolume {
    LogicalVolume {
        full_name: format!("{vg}/{name}"),
        name: name.to_string(),
        path: format!("/dev/{vg}/{name}"),
        vg_name: vg.to_string(),
        size,
        origin: None,
        pool: None,
        dev_major: 0,
        dev_minor: 0,
        tags: BTreeSet::new(),
        attr: attr.to_string(),
    }
}

fn failure(command: String, message: &str) -> SysError {
    SysError::Command(CommandError {
        message: format!("`{command}` failed with exit status: 5: {message}"),
        command,
        exit_code: Some(5),
    })
}

impl FakeLvm {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake lvm state")
    }

    pub fn with_volume_group(self, name: &str, size: u64) -> Self {
        self.lock().groups.insert(
            name.to_string(),
            FakeGroup {
                size,
                free: size,
                ..Default::default()
            },
        );
        self
    }

    /// Carve a thin pool of `size` bytes out of `vg`.
    pub fn with_thin_pool(self, vg: &str, name: &str, size: u64) -> Self {
        {
            let mut state = self.lock();
            let group = state.groups.get_mut(vg).expect("volume group exists");
            group.free -= size;
            group
                .volumes
                .insert(name.to_string(), volume(vg, name, size, "twi-aotz--"));
            group.data_percent.insert(name.to_string(), 0.0);
        }
        self
    }

    pub fn set_data_percent(&self, vg: &str, pool: &str, percent: f64) {
        let mut state = self.lock();
        let group = state.groups.get_mut(vg).expect("volume group exists");
        group.data_percent.insert(pool.to_string(), percent);
    }

    pub fn fail_activation(&self) {
        self.lock().fail_activation = true;
    }

    /// Fail the next `count` full reports.
    pub fn fail_reports(&self, count: usize) {
        self.lock().failing_reports = count;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls of one command, e.g. `lvresize`
    pub fn calls_of(&self, command: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.split(' ').next() == Some(command))
            .collect()
    }

    pub fn volume(&self, vg: &str, name: &str) -> Option<LogicalVolume> {
        self.lock()
            .groups
            .get(vg)
            .and_then(|group| group.volumes.get(name))
            .cloned()
    }

    pub fn free(&self, vg: &str) -> u64 {
        self.lock().groups.get(vg).map_or(0, |group| group.free)
    }

    fn record(state: &mut FakeState, call: String) {
        state.calls.push(call);
    }

    fn group<'a>(state: &'a mut FakeState, vg: &str) -> Result<&'a mut FakeGroup> {
        state
            .groups
            .get_mut(vg)
            .ok_or_else(|| SysError::NotFound(format!("Volume group \"{vg}\" not found")))
    }

    fn snapshot(name: &str, group: &FakeGroup, with_cache: bool) -> VolumeGroup {
        let mut vg = VolumeGroup::new(name, group.size, group.free);
        if with_cache {
            vg.lv_cache = Some(group.volumes.clone());
        }
        vg
    }

    fn insert(state: &mut FakeState, mut lv: LogicalVolume) -> Result<LogicalVolume> {
        state.next_minor += 1;
        lv.dev_major = 253;
        lv.dev_minor = state.next_minor;
        let group = Self::group(state, &lv.vg_name)?;
        if group.volumes.contains_key(&lv.name) {
            return Err(failure(
                format!("lvcreate {}", lv.full_name),
                "Logical volume already exists",
            ));
        }
        group.volumes.insert(lv.name.clone(), lv.clone());
        Ok(lv)
    }
}

impl LvmBackend for FakeLvm {
    fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>> {
        let mut state = self.lock();
        Self::record(&mut state, "fullreport".to_string());
        if state.failing_reports > 0 {
            state.failing_reports -= 1;
            return Err(failure("lvm fullreport".to_string(), "Reading VG metadata failed"));
        }
        Ok(state
            .groups
            .iter()
            .map(|(name, group)| Self::snapshot(name, group, true))
            .collect())
    }

    fn find_volume_group(&self, name: &str) -> Result<VolumeGroup> {
        let mut state = self.lock();
        Self::record(&mut state, format!("vgs {name}"));
        let group = Self::group(&mut state, name)?;
        Ok(Self::snapshot(name, group, false))
    }

    fn refresh_volume_group(&self, vg: &mut VolumeGroup) -> Result<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("vgs {}", vg.name));
        let with_cache = vg.lv_cache.is_some();
        let group = Self::group(&mut state, &vg.name)?;
        vg.replace_with(Self::snapshot(&vg.name, group, with_cache));
        Ok(())
    }

    fn list_volumes(&self, vg: &VolumeGroup) -> Result<Vec<LogicalVolume>> {
        if let Some(cache) = &vg.lv_cache {
            return Ok(cache.values().cloned().collect());
        }
        let mut state = self.lock();
        Self::record(&mut state, format!("lvs {}", vg.name));
        let group = Self::group(&mut state, &vg.name)?;
        Ok(group.volumes.values().cloned().collect())
    }

    fn find_volume(&self, vg: &VolumeGroup, name: &str) -> Result<LogicalVolume> {
        let mut state = self.lock();
        Self::record(&mut state, format!("lvs {}/{name}", vg.name));
        let group = Self::group(&mut state, &vg.name)?;
        group.volumes.get(name).cloned().ok_or_else(|| {
            SysError::NotFound(format!(
                "Failed to find logical volume \"{}/{name}\"",
                vg.name
            ))
        })
    }

    fn pool_usage(&self, pool: &ThinPool) -> Result<ThinPoolUsage> {
        let mut state = self.lock();
        Self::record(&mut state, format!("lvs {}", pool.lv.full_name));
        let group = Self::group(&mut state, pool.vg_name())?;
        let virtual_bytes = group
            .volumes
            .values()
            .filter(|lv| lv.pool.as_deref() == Some(pool.name()))
            .map(|lv| lv.size)
            .sum();
        let size_bytes = group
            .volumes
            .get(pool.name())
            .map_or(pool.size(), |lv| lv.size);
        Ok(ThinPoolUsage {
            data_percent: group.data_percent.get(pool.name()).copied().unwrap_or(0.0),
            metadata_percent: 1.5,
            virtual_bytes,
            size_bytes,
        })
    }

    fn create_volume(&self, vg: &VolumeGroup, request: &CreateVolume) -> Result<LogicalVolume> {
        let mut state = self.lock();
        let command = format!("lvcreate {}/{}", vg.name, request.name);
        Self::record(&mut state, command.clone());

        let group = Self::group(&mut state, &vg.name)?;
        if group.free < request.size {
            return Err(failure(command, "Insufficient free space"));
        }
        group.free -= request.size;

        let mut lv = volume(&vg.name, &request.name, request.size, "-wi-a-----");
        lv.tags = request.tags.iter().cloned().collect();
        Self::insert(&mut state, lv)
    }

    fn create_thin_volume(
        &self,
        pool: &ThinPool,
        request: &CreateVolume,
    ) -> Result<LogicalVolume> {
        let mut state = self.lock();
        Self::record(
            &mut state,
            format!("lvcreate {}/{}", pool.vg_name(), request.name),
        );

        let mut lv = volume(pool.vg_name(), &request.name, request.size, "Vwi-a-tz--");
        lv.pool = Some(pool.name().to_string());
        lv.tags = request.tags.iter().cloned().collect();
        Self::insert(&mut state, lv)
    }

    fn create_thin_snapshot(
        &self,
        source: &LogicalVolume,
        name: &str,
        tags: &[String],
    ) -> Result<LogicalVolume> {
        let mut state = self.lock();
        Self::record(&mut state, format!("lvcreate {}/{name}", source.vg_name));
        if !source.is_thin() {
            return Err(SysError::InvalidArgument(format!(
                "{} is not a thin volume",
                source.full_name
            )));
        }

        let mut lv = volume(&source.vg_name, name, source.size, "Vwi---tz-k");
        lv.pool = source.pool.clone();
        lv.origin = Some(source.name.clone());
        lv.tags = tags.iter().cloned().collect();
        let mut lv = Self::insert(&mut state, lv)?;

        // Snapshots are created inactive.
        lv.dev_major = 0;
        lv.dev_minor = 0;
        let group = Self::group(&mut state, &source.vg_name)?;
        group.volumes.insert(name.to_string(), lv.clone());
        Ok(lv)
    }

    fn resize_volume(&self, lv: &mut LogicalVolume, size: u64) -> Result<()> {
        let mut state = self.lock();
        let command = format!("lvresize {}", lv.full_name);
        Self::record(&mut state, command.clone());

        let group = Self::group(&mut state, &lv.vg_name)?;
        let Some(stored) = group.volumes.get_mut(&lv.name) else {
            return Err(SysError::NotFound(format!(
                "Failed to find logical volume \"{}\"",
                lv.full_name
            )));
        };
        if stored.pool.is_none() {
            let delta = size.saturating_sub(stored.size);
            if group.free < delta {
                return Err(failure(command, "Insufficient free space"));
            }
            group.free -= delta;
        }
        stored.size = size;
        *lv = stored.clone();
        Ok(())
    }

    fn rename_volume(&self, lv: &mut LogicalVolume, new_name: &str) -> Result<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("lvrename {}", lv.full_name));
        let group = Self::group(&mut state, &lv.vg_name)?;
        let Some(mut stored) = group.volumes.remove(&lv.name) else {
            return Err(SysError::NotFound(format!(
                "Failed to find logical volume \"{}\"",
                lv.full_name
            )));
        };
        stored.rename_to(new_name);
        group.volumes.insert(new_name.to_string(), stored);
        lv.rename_to(new_name);
        Ok(())
    }

    fn activate_volume(&self, lv: &LogicalVolume, access: Access) -> Result<()> {
        let mut state = self.lock();
        let command = format!("lvchange {}", lv.full_name);
        Self::record(&mut state, command.clone());
        if state.fail_activation {
            return Err(failure(command, "Activation failed"));
        }

        let minor = state.next_minor + 1;
        state.next_minor = minor;
        let group = Self::group(&mut state, &lv.vg_name)?;
        if let Some(stored) = group.volumes.get_mut(&lv.name) {
            stored.dev_major = 253;
            stored.dev_minor = minor;
            stored.attr = match access {
                Access::ReadOnly => "Vri-a-tz-k".to_string(),
                Access::ReadWrite => "Vwi-a-tz-k".to_string(),
            };
        }
        Ok(())
    }

    fn remove_volume(&self, lv: &LogicalVolume) -> Result<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("lvremove {}", lv.full_name));
        let group = Self::group(&mut state, &lv.vg_name)?;
        let Some(removed) = group.volumes.remove(&lv.name) else {
            return Err(SysError::NotFound(format!(
                "Failed to find logical volume \"{}\"",
                lv.full_name
            )));
        };
        if removed.pool.is_none() {
            group.free += removed.size;
        }
        Ok(())
    }
}
