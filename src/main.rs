//! `telebridge`: bridges one TCP telemetry device to live WebSocket viewers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use telebridge_core::{SnapshotPublisher, TelemetryStore};
use telebridge_device::{ConnectionManager, DeviceConfig};
use telebridge_logging::{LoggingConfig, init_logging};
use telebridge_server::{
    BridgeServer, BroadcastHub, DEFAULT_DRAIN_GRACE, DeviceSink, ServerConfig, ShutdownCoordinator,
};
use telebridge_settings::BridgeSettings;
use tracing::{error, info};

/// Command-line flags. Each one overrides the settings file and environment.
#[derive(Debug, Parser)]
#[command(name = "telebridge", version, about)]
struct Cli {
    /// Settings file (default `~/.telebridge/settings.json`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Bind address for both listeners.
    #[arg(long)]
    host: Option<String>,

    /// TCP port the device connects to.
    #[arg(long)]
    device_port: Option<u16>,

    /// HTTP / WebSocket port for viewers.
    #[arg(long)]
    viewer_port: Option<u16>,

    /// Default log level (`RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(host) = &self.host {
            settings.host.clone_from(host);
        }
        if let Some(port) = self.device_port {
            settings.device.port = port;
        }
        if let Some(port) = self.viewer_port {
            settings.viewer.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn device_config(settings: &BridgeSettings) -> DeviceConfig {
    DeviceConfig {
        host: settings.host.clone(),
        port: settings.device.port,
        read_timeout: settings.device.read_timeout_secs.map(Duration::from_secs),
        max_frame_bytes: settings.device.max_frame_bytes,
        read_buffer_bytes: settings.device.read_buffer_bytes,
        command_queue: settings.device.command_queue,
        ..DeviceConfig::default()
    }
}

fn server_config(settings: &BridgeSettings) -> ServerConfig {
    ServerConfig {
        host: settings.host.clone(),
        port: settings.viewer.port,
        max_send_queue: settings.viewer.max_send_queue,
        heartbeat_interval_secs: settings.viewer.heartbeat_interval_secs,
        heartbeat_timeout_secs: settings.viewer.heartbeat_timeout_secs,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Log with the flag-level config while settings load, then switch to the
    // configured level and format.
    let mut logging = init_logging(&LoggingConfig::from_level_name(
        cli.log_level.as_deref().unwrap_or("info"),
        cli.log_json,
    ))?;

    let settings_file = cli.config.clone().unwrap_or_else(telebridge_settings::settings_path);
    let mut settings = telebridge_settings::load_settings_from_path(&settings_file)
        .with_context(|| format!("failed to load settings from {}", settings_file.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings")?;

    logging.reconfigure(&LoggingConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ))?;
    info!(
        filter = logging.filter(),
        settings = %settings_file.display(),
        host = %settings.host,
        device_port = settings.device.port,
        viewer_port = settings.viewer.port,
        "starting telebridge"
    );

    let store = Arc::new(TelemetryStore::new());
    let hub = Arc::new(BroadcastHub::new(
        Arc::clone(&store),
        settings.viewer.max_send_queue,
    ));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let (manager, device) = ConnectionManager::new(
        device_config(&settings),
        Arc::clone(&store),
        Arc::clone(&hub) as Arc<dyn SnapshotPublisher>,
        shutdown.token(),
    );
    // Viewers still get served when the device port is unavailable; they see
    // the startup failure in the status field.
    match manager.bind().await {
        Ok(listener) => shutdown.spawn("device listener", listener.run()),
        Err(e) => error!(error = %e, "device listener unavailable"),
    }

    let server = BridgeServer::new(
        server_config(&settings),
        store,
        hub,
        Arc::new(device) as Arc<dyn DeviceSink>,
        Arc::clone(&shutdown),
    );
    let listener = server
        .bind()
        .await
        .with_context(|| format!("failed to bind viewer server on {}", server.config().bind_addr()))?;
    shutdown.spawn("viewer server", async move {
        if let Err(e) = server.serve(listener).await {
            error!(error = %e, "viewer server failed");
        }
    });

    let _ = shutdown
        .wait_for_signal()
        .await
        .context("failed to listen for shutdown signals")?;
    let report = shutdown.drain(DEFAULT_DRAIN_GRACE).await;
    info!(
        finished = ?report.finished,
        aborted = ?report.aborted,
        failed = ?report.failed,
        "telebridge stopped"
    );

    Ok(())
}
