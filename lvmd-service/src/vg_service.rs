// SPDX-License-Identifier: GPL-3.0-only

//! Volume group queries and the capacity watch

use std::sync::Arc;

use async_trait::async_trait;
use lvmd_sys::LvmBackend;
use lvmd_types::{
    DeviceClass, GetFreeBytesRequest, GetFreeBytesResponse, GetLvListRequest, GetLvListResponse,
    LogicalVolumeInfo, ThinPoolItem, WatchItem, WatchResponse,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::blocking::{run_blocking, target_pool, target_volume_group};
use crate::capacity;
use crate::device_class::DeviceClassManager;
use crate::error::{Result, ServiceError};
use crate::notify::{Notifier, Watchers};

/// Receiver of watch snapshots
#[async_trait]
pub trait WatchSink: Send {
    /// Deliver one snapshot. An error ends the watch.
    async fn deliver(&mut self, snapshot: WatchResponse) -> Result<()>;
}

#[async_trait]
impl WatchSink for mpsc::Sender<WatchResponse> {
    async fn deliver(&mut self, snapshot: WatchResponse) -> Result<()> {
        self.send(snapshot)
            .await
            .map_err(|_| ServiceError::Internal("watch receiver closed".to_string()))
    }
}

pub struct VgService {
    backend: Arc<dyn LvmBackend>,
    device_classes: Arc<DeviceClassManager>,
    watchers: Watchers,
}

impl VgService {
    pub fn new(
        backend: Arc<dyn LvmBackend>,
        device_classes: Arc<DeviceClassManager>,
        watchers: Watchers,
    ) -> Self {
        Self {
            backend,
            device_classes,
            watchers,
        }
    }

    /// Callback for mutating services to wake every watch
    pub fn notifier(&self) -> Notifier {
        self.watchers.notifier()
    }

    fn device_class(&self, name: &str) -> Result<DeviceClass> {
        self.device_classes.device_class(name).cloned()
    }

    /// Volumes of a device class. Thick classes never list thin volumes;
    /// thin classes list the members of their pool.
    pub async fn get_lv_list(&self, request: GetLvListRequest) -> Result<GetLvListResponse> {
        let class = self.device_class(&request.device_class)?;

        let volumes = run_blocking(&self.backend, move |backend| {
            let vg = target_volume_group(backend, &class)?;
            let mut volumes = backend.list_volumes(&vg)?;
            match class.pool_name().filter(|_| class.is_thin()) {
                Some(pool) => volumes.retain(|lv| lv.pool.as_deref() == Some(pool)),
                None => volumes.retain(|lv| !lv.is_thin()),
            }
            Ok(volumes)
        })
        .await?;

        for lv in &volumes {
            if let Err(e) = lv.verify_health() {
                warn!("Logical volume {} is unhealthy: {e}", lv.full_name);
            }
        }

        Ok(GetLvListResponse {
            volumes: volumes.iter().map(LogicalVolumeInfo::from).collect(),
        })
    }

    pub async fn get_free_bytes(
        &self,
        request: GetFreeBytesRequest,
    ) -> Result<GetFreeBytesResponse> {
        let class = self.device_class(&request.device_class)?;

        let free_bytes = run_blocking(&self.backend, move |backend| {
            let vg = target_volume_group(backend, &class)?;
            match class.thin_pool.as_ref().filter(|_| class.is_thin()) {
                Some(config) => {
                    let pool = target_pool(backend, &class, &vg)?;
                    let usage = backend.pool_usage(&pool)?;
                    Ok(capacity::thin_free_bytes(config, &usage))
                }
                None => Ok(capacity::thick_free_bytes(&vg, &class)),
            }
        })
        .await?;

        Ok(GetFreeBytesResponse { free_bytes })
    }

    /// Capacity of every device class whose volume group or thin pool
    /// exists. Groups and pools without a device class are skipped.
    pub async fn capacity_snapshot(&self) -> Result<WatchResponse> {
        let device_classes = Arc::clone(&self.device_classes);

        run_blocking(&self.backend, move |backend| {
            let mut response = WatchResponse::default();

            for vg in backend.list_volume_groups()? {
                if let Some(class) = device_classes.for_volume_group(&vg.name) {
                    response.items.push(WatchItem {
                        device_class: class.name.clone(),
                        free_bytes: capacity::thick_free_bytes(&vg, class),
                        size_bytes: vg.size,
                        thin_pool: None,
                    });
                }

                for pool in backend.list_pools(&vg)? {
                    let Some(class) = device_classes.for_thin_pool(&vg.name, pool.name()) else {
                        continue;
                    };
                    let Some(config) = &class.thin_pool else {
                        continue;
                    };
                    let usage = backend.pool_usage(&pool)?;
                    let overprovision_bytes = capacity::overprovision_free_bytes(config, &usage);
                    let size_bytes = if config.skip_overprovisioning {
                        usage.size_bytes
                    } else {
                        capacity::virtual_pool_size(config, &usage)
                    };

                    response.items.push(WatchItem {
                        device_class: class.name.clone(),
                        free_bytes: capacity::thin_free_bytes(config, &usage),
                        size_bytes,
                        thin_pool: Some(ThinPoolItem {
                            data_percent: usage.data_percent,
                            metadata_percent: usage.metadata_percent,
                            size_bytes: usage.size_bytes,
                            overprovision_bytes,
                        }),
                    });
                }
            }

            if let Some(default) = device_classes.default_class() {
                response.free_bytes = response
                    .item(&default.name)
                    .map_or(0, |item| item.free_bytes);
            }
            Ok(response)
        })
        .await
    }

    async fn send_snapshot<S: WatchSink>(&self, sink: &mut S) -> Result<()> {
        let snapshot = self.capacity_snapshot().await?;
        debug!("Sending capacity snapshot with {} items", snapshot.items.len());
        sink.deliver(snapshot).await
    }

    /// Push a full snapshot now and after every notification until `cancel`
    /// fires. A failed snapshot or delivery ends the watch with its error.
    pub async fn watch<S: WatchSink>(&self, cancel: CancellationToken, sink: &mut S) -> Result<()> {
        let mut subscription = self.watchers.subscribe();
        self.send_snapshot(sink).await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                changed = subscription.changed() => {
                    if !changed {
                        return Ok(());
                    }
                    self.send_snapshot(sink).await?;
                }
            }
        }
    }
}
