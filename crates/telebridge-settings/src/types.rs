//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every struct is `#[serde(default)]`, so
//! a partial file only needs the values it changes:
//!
//! ```json
//! { "device": { "port": 9100, "readTimeoutSecs": 120 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Bind address shared by both listeners.
    pub host: String,
    /// Device-facing TCP listener.
    pub device: DeviceSettings,
    /// Viewer-facing HTTP / WebSocket server.
    pub viewer: ViewerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            device: DeviceSettings::default(),
            viewer: ViewerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host must not be empty".into()));
        }
        if self.device.port != 0 && self.device.port == self.viewer.port {
            return Err(SettingsError::InvalidValue(format!(
                "device and viewer ports must differ (both {})",
                self.device.port
            )));
        }
        if self.device.max_frame_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "device.maxFrameBytes must be positive".into(),
            ));
        }
        if self.viewer.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "viewer.heartbeatIntervalSecs must be positive".into(),
            ));
        }
        if self.viewer.heartbeat_timeout_secs < self.viewer.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "viewer.heartbeatTimeoutSecs must be at least the heartbeat interval".into(),
            ));
        }
        Ok(())
    }
}

/// Device listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// TCP port the device connects to.
    pub port: u16,
    /// Tear the session down after this many seconds without data. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Largest partial frame buffered before it is discarded as malformed.
    pub max_frame_bytes: usize,
    /// Bytes requested per transport read.
    pub read_buffer_bytes: usize,
    /// Pending outbound commands queued for the device task.
    pub command_queue: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            port: 9000,
            read_timeout_secs: None,
            max_frame_bytes: 64 * 1024,
            read_buffer_bytes: 1024,
            command_queue: 32,
        }
    }
}

/// Viewer server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerSettings {
    /// HTTP / WebSocket port.
    pub port: u16,
    /// Per-viewer queue of undelivered snapshots.
    pub max_send_queue: usize,
    /// WebSocket ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a viewer after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            port: 5000,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
