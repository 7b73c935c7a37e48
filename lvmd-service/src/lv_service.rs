// SPDX-License-Identifier: GPL-3.0-only

//! Logical volume operations
//!
//! Each call resolves its device class, admission-checks the request against
//! the capacity engine, mutates LVM and re-reads the result. Successful
//! mutations fire the capacity notifier once, after LVM reported success.

use std::sync::Arc;

use lvmd_sys::{CreateVolume, LvmBackend};
use lvmd_types::{
    Access, CreateLvRequest, CreateLvResponse, CreateLvSnapshotRequest, CreateLvSnapshotResponse,
    DeviceClass, LogicalVolume, LogicalVolumeInfo, RemoveLvRequest, RemoveLvResponse,
    ResizeLvRequest, ResizeLvResponse,
};
use tracing::{error, info, warn};

use crate::blocking::{run_blocking, target_pool, target_volume_group};
use crate::capacity::{self, Admission};
use crate::device_class::{DeviceClassManager, LvcreateOptionClassManager};
use crate::error::{Result, ServiceError};
use crate::notify::Notifier;

pub struct LvService {
    backend: Arc<dyn LvmBackend>,
    device_classes: Arc<DeviceClassManager>,
    option_classes: Arc<LvcreateOptionClassManager>,
    notifier: Notifier,
}

impl LvService {
    pub fn new(
        backend: Arc<dyn LvmBackend>,
        device_classes: Arc<DeviceClassManager>,
        option_classes: Arc<LvcreateOptionClassManager>,
        notifier: Notifier,
    ) -> Self {
        Self {
            backend,
            device_classes,
            option_classes,
            notifier,
        }
    }

    fn device_class(&self, name: &str) -> Result<DeviceClass> {
        self.device_classes.device_class(name).cloned()
    }

    fn notify(&self) {
        (self.notifier)();
    }

    pub async fn create_lv(&self, request: CreateLvRequest) -> Result<CreateLvResponse> {
        let class = self.device_class(&request.device_class)?;
        let size = request.requested_bytes();
        capacity::check_size(size)?;

        let mut volume = CreateVolume {
            tags: request.tags.clone(),
            ..CreateVolume::new(request.name.clone(), size)
        };
        if !class.is_thin() {
            volume.stripe = class.stripe;
            volume.stripe_size = class.stripe_size.clone();
            volume.options = class.lvcreate_options.clone();
        }
        if !request.lvcreate_option_class.is_empty() {
            let Some(option_class) = self
                .option_classes
                .option_class(&request.lvcreate_option_class)
            else {
                return Err(ServiceError::InvalidArgument(format!(
                    "unknown lvcreate option class {:?}",
                    request.lvcreate_option_class
                )));
            };
            if !class.is_thin() {
                volume.options.extend(option_class.options.iter().cloned());
            }
        }

        let lv = run_blocking(&self.backend, move |backend| {
            let vg = target_volume_group(backend, &class)?;
            if let Some(config) = class.thin_pool.as_ref().filter(|_| class.is_thin()) {
                let pool = target_pool(backend, &class, &vg)?;
                let usage = backend.pool_usage(&pool)?;
                Admission::thin(size, config, &usage).check()?;
                Ok(backend.create_thin_volume(&pool, &volume)?)
            } else {
                Admission::thick(size, &vg, &class).check()?;
                Ok(backend.create_volume(&vg, &volume)?)
            }
        })
        .await
        .inspect_err(|e| error!("Failed to create {}: {e}", request.name))?;

        self.notify();
        info!("Created logical volume {} ({} bytes)", lv.full_name, lv.size);
        Ok(CreateLvResponse {
            volume: LogicalVolumeInfo::from(&lv),
        })
    }

    pub async fn remove_lv(&self, request: RemoveLvRequest) -> Result<RemoveLvResponse> {
        let class = self.device_class(&request.device_class)?;
        let name = request.name.clone();

        let full_name = run_blocking(&self.backend, move |backend| {
            let vg = target_volume_group(backend, &class)?;
            let lv = backend.find_volume(&vg, &name)?;
            backend.remove_volume(&lv)?;
            Ok(lv.full_name)
        })
        .await
        .inspect_err(|e| {
            if !e.is_not_found() {
                error!("Failed to remove {}: {e}", request.name);
            }
        })?;

        self.notify();
        info!("Removed logical volume {full_name}");
        Ok(RemoveLvResponse {})
    }

    /// Grow a volume. Requests at or below the current size return the
    /// current size without touching LVM.
    pub async fn resize_lv(&self, request: ResizeLvRequest) -> Result<ResizeLvResponse> {
        let class = self.device_class(&request.device_class)?;
        let requested = request.requested_bytes();
        if requested == 0 {
            return Err(ServiceError::InvalidArgument(
                "size must be greater than zero".to_string(),
            ));
        }
        let name = request.name.clone();

        let (size_bytes, resized) = run_blocking(&self.backend, move |backend| {
            let vg = target_volume_group(backend, &class)?;
            let mut lv = backend.find_volume(&vg, &name)?;
            if requested <= lv.size {
                return Ok((lv.size, false));
            }

            let delta = requested - lv.size;
            if let Some(config) = class.thin_pool.as_ref().filter(|_| class.is_thin()) {
                let pool = target_pool(backend, &class, &vg)?;
                let usage = backend.pool_usage(&pool)?;
                Admission::thin(delta, config, &usage).check()?;
            } else {
                Admission::thick(delta, &vg, &class).check()?;
            }

            backend.resize_volume(&mut lv, requested)?;
            Ok((lv.size, true))
        })
        .await
        .inspect_err(|e| error!("Failed to resize {}: {e}", request.name))?;

        if resized {
            self.notify();
            info!("Resized logical volume {} to {size_bytes} bytes", request.name);
        }
        Ok(ResizeLvResponse { size_bytes })
    }

    /// Thin snapshot of an existing thin volume, grown to the requested size
    /// and activated. A snapshot that cannot be grown or activated is
    /// removed again and the original error returned.
    pub async fn create_lv_snapshot(
        &self,
        request: CreateLvSnapshotRequest,
    ) -> Result<CreateLvSnapshotResponse> {
        let class = self.device_class(&request.device_class)?;
        if !class.is_thin() {
            return Err(ServiceError::Unimplemented(format!(
                "device class {:?} is thick; snapshots need a thin device class",
                class.name
            )));
        }
        let access: Access = request
            .access_type
            .parse()
            .map_err(ServiceError::InvalidArgument)?;
        let requested = request.requested_bytes();
        if requested > 0 {
            capacity::check_size(requested)?;
        }

        let name = request.name.clone();
        let source_name = request.source_volume.clone();
        let tags = request.tags.clone();

        let snapshot = run_blocking(&self.backend, move |backend| {
            let vg = target_volume_group(backend, &class)?;
            let pool = target_pool(backend, &class, &vg)?;
            let source = backend.find_volume(&vg, &source_name)?;
            if !source.is_thin() {
                return Err(ServiceError::InvalidArgument(format!(
                    "source volume {} is not a thin volume",
                    source.full_name
                )));
            }

            let desired = if requested > 0 { requested } else { source.size };
            if desired < source.size {
                return Err(ServiceError::OutOfRange(format!(
                    "requested {desired} bytes is smaller than source volume {} ({} bytes)",
                    source.full_name, source.size
                )));
            }

            if let Some(config) = &class.thin_pool {
                let usage = backend.pool_usage(&pool)?;
                Admission::thin(desired, config, &usage).check()?;
            }

            let mut snapshot = backend.create_thin_snapshot(&source, &name, &tags)?;
            if let Err(e) = finish_snapshot(backend, &mut snapshot, desired, access) {
                if let Err(cleanup) = backend.remove_volume(&snapshot) {
                    warn!(
                        "Failed to remove snapshot {} after failed setup: {cleanup}",
                        snapshot.full_name
                    );
                }
                return Err(e);
            }

            Ok(backend.find_volume(&vg, &name)?)
        })
        .await
        .inspect_err(|e| error!("Failed to create snapshot {}: {e}", request.name))?;

        self.notify();
        info!(
            "Created snapshot {} of {} ({} bytes, {access})",
            snapshot.full_name, request.source_volume, snapshot.size
        );
        Ok(CreateLvSnapshotResponse {
            snapshot: LogicalVolumeInfo::from(&snapshot),
        })
    }
}

fn finish_snapshot(
    backend: &dyn LvmBackend,
    snapshot: &mut LogicalVolume,
    desired: u64,
    access: Access,
) -> Result<()> {
    if desired > snapshot.size {
        backend.resize_volume(snapshot, desired)?;
    }
    backend.activate_volume(snapshot, access)?;
    Ok(())
}
