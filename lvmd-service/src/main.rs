// SPDX-License-Identifier: GPL-3.0-only

//! lvmd - node-local LVM storage service
//!
//! Serves logical volume provisioning and capacity reporting for the
//! configured device classes over D-Bus.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lvmd_sys::{LvmCommand, LvmTool};
use lvmd_service::config::DEFAULT_CONFIG_PATH;
use lvmd_service::transport::{
    LV_OBJECT_PATH, LvHandler, SERVICE_NAME, VG_OBJECT_PATH, VgHandler, monitor_capacity,
};
use lvmd_service::{BusKind, LvService, LvmdConfig, VgService, Watchers};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};
use zbus::connection::Builder as ConnectionBuilder;

#[derive(Debug, Parser)]
#[command(name = "lvmd", version, about = "Node-local LVM storage service")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Program and arguments used to run lvm, overriding the configuration
    #[arg(long, num_args = 1.., value_name = "ARG")]
    lvm_prefix: Option<Vec<String>>,

    /// Register on the session bus instead of the system bus
    #[arg(long)]
    session: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lvmd=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("Starting lvmd v{}", env!("CARGO_PKG_VERSION"));

    let config = LvmdConfig::load(&args.config)?;
    let command = match args.lvm_prefix {
        Some(prefix) => LvmCommand::new(prefix).context("invalid --lvm-prefix")?,
        None => config.lvm_command()?,
    };
    let device_classes = Arc::new(config.device_class_manager()?);
    let option_classes = Arc::new(config.option_class_manager()?);
    let bus = if args.session {
        BusKind::Session
    } else {
        config.bus
    };

    // Check if running as root
    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("lvmd must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    tracing::info!(
        "Device classes: {}",
        device_classes
            .classes()
            .iter()
            .map(|class| class.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!("Running lvm as `{}`", command.prefix().join(" "));

    let backend = Arc::new(LvmTool::new(command));
    let watchers = Watchers::new();
    let vg_service = Arc::new(VgService::new(
        backend.clone(),
        device_classes.clone(),
        watchers.clone(),
    ));
    let lv_service = Arc::new(LvService::new(
        backend,
        device_classes,
        option_classes,
        vg_service.notifier(),
    ));

    let builder = match bus {
        BusKind::System => ConnectionBuilder::system()?,
        BusKind::Session => ConnectionBuilder::session()?,
    };
    let connection = builder
        .name(SERVICE_NAME)?
        .serve_at(LV_OBJECT_PATH, LvHandler::new(lv_service))?
        .serve_at(VG_OBJECT_PATH, VgHandler::new(vg_service.clone()))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!("Service registered on the {bus:?} bus as {SERVICE_NAME}");
    tracing::info!("  - Logical volume interface at {LV_OBJECT_PATH}");
    tracing::info!("  - Volume group interface at {VG_OBJECT_PATH}");

    let cancel = CancellationToken::new();
    let monitor =
        monitor_capacity(connection.clone(), VG_OBJECT_PATH, vg_service, cancel.clone()).await?;

    tracing::info!("Service ready, waiting for requests...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    cancel.cancel();
    if let Err(e) = monitor.await {
        tracing::warn!("Capacity monitor did not stop cleanly: {e}");
    }

    tracing::info!("lvmd shutting down");
    Ok(())
}
