// SPDX-License-Identifier: GPL-3.0-only

//! LVM D-Bus interfaces
//!
//! Requests and responses travel as JSON strings. Errors carry the JSON form
//! of [`lvmd_types::LvmdError`] as their message.

use std::sync::Arc;
use std::time::Duration;

use lvmd_types::{
    CreateLvRequest, CreateLvSnapshotRequest, GetFreeBytesRequest, GetLvListRequest,
    RemoveLvRequest, ResizeLvRequest, WatchResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zbus::{Connection, fdo, interface};

use crate::lv_service::LvService;
use crate::vg_service::{VgService, WatchSink};

/// Well-known bus name
pub const SERVICE_NAME: &str = "org.lvmd";

pub const LV_OBJECT_PATH: &str = "/org/lvmd/Lv";

pub const VG_OBJECT_PATH: &str = "/org/lvmd/Vg";

/// Pause before resubscribing after a failed capacity watch
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

fn parse_request<T: DeserializeOwned>(json: &str) -> fdo::Result<T> {
    serde_json::from_str(json)
        .map_err(|e| fdo::Error::InvalidArgs(format!("Invalid request JSON: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| fdo::Error::Failed(format!("Serialize error: {e}")))
}

/// D-Bus interface for logical volume operations
pub struct LvHandler {
    service: Arc<LvService>,
}

impl LvHandler {
    pub fn new(service: Arc<LvService>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.lvmd.Lv")]
impl LvHandler {
    /// Create a thick or thin logical volume
    ///
    /// Args: JSON CreateLvRequest. Returns: JSON CreateLvResponse
    #[zbus(name = "CreateLV")]
    async fn create_lv(&self, request: &str) -> fdo::Result<String> {
        let request: CreateLvRequest = parse_request(request)?;
        tracing::debug!("CreateLV {} in {:?}", request.name, request.device_class);
        to_json(&self.service.create_lv(request).await?)
    }

    /// Args: JSON RemoveLvRequest. Returns: JSON RemoveLvResponse
    #[zbus(name = "RemoveLV")]
    async fn remove_lv(&self, request: &str) -> fdo::Result<String> {
        let request: RemoveLvRequest = parse_request(request)?;
        tracing::debug!("RemoveLV {} in {:?}", request.name, request.device_class);
        to_json(&self.service.remove_lv(request).await?)
    }

    /// Args: JSON ResizeLvRequest. Returns: JSON ResizeLvResponse
    #[zbus(name = "ResizeLV")]
    async fn resize_lv(&self, request: &str) -> fdo::Result<String> {
        let request: ResizeLvRequest = parse_request(request)?;
        tracing::debug!("ResizeLV {} in {:?}", request.name, request.device_class);
        to_json(&self.service.resize_lv(request).await?)
    }

    /// Args: JSON CreateLvSnapshotRequest. Returns: JSON CreateLvSnapshotResponse
    #[zbus(name = "CreateLVSnapshot")]
    async fn create_lv_snapshot(&self, request: &str) -> fdo::Result<String> {
        let request: CreateLvSnapshotRequest = parse_request(request)?;
        tracing::debug!(
            "CreateLVSnapshot {} of {} in {:?}",
            request.name,
            request.source_volume,
            request.device_class
        );
        to_json(&self.service.create_lv_snapshot(request).await?)
    }
}

/// D-Bus interface for volume group queries and capacity updates
pub struct VgHandler {
    service: Arc<VgService>,
}

impl VgHandler {
    pub fn new(service: Arc<VgService>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.lvmd.Vg")]
impl VgHandler {
    /// Emitted with a JSON WatchResponse on subscribe and after every change
    #[zbus(signal)]
    async fn capacity_changed(
        signal_ctxt: &zbus::object_server::SignalEmitter<'_>,
        snapshot: &str,
    ) -> zbus::Result<()>;

    /// Args: JSON GetLvListRequest. Returns: JSON GetLvListResponse
    #[zbus(name = "GetLVList")]
    async fn get_lv_list(&self, request: &str) -> fdo::Result<String> {
        let request: GetLvListRequest = parse_request(request)?;
        to_json(&self.service.get_lv_list(request).await?)
    }

    /// Args: JSON GetFreeBytesRequest. Returns: JSON GetFreeBytesResponse
    async fn get_free_bytes(&self, request: &str) -> fdo::Result<String> {
        let request: GetFreeBytesRequest = parse_request(request)?;
        to_json(&self.service.get_free_bytes(request).await?)
    }

    /// Current capacity snapshot. Returns: JSON WatchResponse
    async fn get_capacity(&self) -> fdo::Result<String> {
        to_json(&self.service.capacity_snapshot().await?)
    }
}

/// Run the capacity watch until `cancel` fires, resubscribing after
/// `retry_delay` whenever a snapshot or delivery fails.
pub(crate) async fn keep_watching<S: WatchSink>(
    service: &VgService,
    cancel: CancellationToken,
    sink: &mut S,
    retry_delay: Duration,
) {
    loop {
        match service.watch(cancel.clone(), sink).await {
            Ok(()) => return,
            Err(e) => tracing::error!("Capacity watch failed, resubscribing: {e}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

/// Watch capacity and emit every snapshot as a `CapacityChanged` signal on
/// the volume group interface until `cancel` fires.
pub async fn monitor_capacity(
    connection: Connection,
    object_path: &str,
    service: Arc<VgService>,
    cancel: CancellationToken,
) -> zbus::Result<JoinHandle<()>> {
    tracing::info!("Starting capacity monitoring");

    let iface_ref = connection
        .object_server()
        .interface::<_, VgHandler>(object_path)
        .await?;

    let (mut sender, mut receiver) = mpsc::channel::<WatchResponse>(1);
    let watcher = tokio::spawn(async move {
        keep_watching(&service, cancel, &mut sender, WATCH_RETRY_DELAY).await;
    });

    Ok(tokio::spawn(async move {
        while let Some(snapshot) = receiver.recv().await {
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    if let Err(e) =
                        VgHandler::capacity_changed(iface_ref.signal_emitter(), &json).await
                    {
                        tracing::error!("Failed to emit capacity_changed signal: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize capacity snapshot: {}", e),
            }
        }
        if let Err(e) = watcher.await {
            tracing::error!("Capacity watch task failed: {e}");
        }
        tracing::info!("Capacity monitoring stopped");
    }))
}
