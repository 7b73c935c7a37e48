// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use lvmd_sys::LvmBackend;
use lvmd_types::{DeviceClass, ThinPool, VolumeGroup};

use crate::error::{Result, ServiceError};

/// Run backend work on the blocking pool; `lvm` calls wait on child
/// processes.
pub(crate) async fn run_blocking<T, F>(backend: &Arc<dyn LvmBackend>, work: F) -> Result<T>
where
    F: FnOnce(&dyn LvmBackend) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let backend = Arc::clone(backend);
    tokio::task::spawn_blocking(move || work(backend.as_ref()))
        .await
        .map_err(|e| ServiceError::Internal(format!("LVM task failed: {e}")))?
}

/// Volume group backing `class`. A configured group that LVM does not know
/// is a deployment fault, not a missing object of the request.
pub(crate) fn target_volume_group(
    backend: &dyn LvmBackend,
    class: &DeviceClass,
) -> Result<VolumeGroup> {
    backend
        .find_volume_group(&class.volume_group)
        .map_err(|e| {
            ServiceError::Internal(format!(
                "volume group {} of device class {:?}: {e}",
                class.volume_group, class.name
            ))
        })
}

/// Thin pool backing a thin `class`.
pub(crate) fn target_pool(
    backend: &dyn LvmBackend,
    class: &DeviceClass,
    vg: &VolumeGroup,
) -> Result<ThinPool> {
    let Some(pool_name) = class.pool_name().filter(|_| class.is_thin()) else {
        return Err(ServiceError::Internal(format!(
            "device class {:?} has no thin pool",
            class.name
        )));
    };
    backend.find_pool(vg, pool_name).map_err(|e| {
        ServiceError::Internal(format!(
            "thin pool {}/{pool_name} of device class {:?}: {e}",
            vg.name, class.name
        ))
    })
}
