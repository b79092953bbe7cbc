//! Viewer command validation and hand-off to the device.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use telebridge_core::{Ack, Command, DeviceError, DispatchError};
use telebridge_device::{DeviceHandle, SessionInfo};
use tracing::{debug, info};

/// Where encoded commands go.
#[async_trait]
pub trait DeviceSink: Send + Sync {
    /// Write `bytes` to the active device session.
    async fn send_to_device(&self, bytes: Bytes) -> Result<(), DeviceError>;

    /// The active device session, if any.
    fn session(&self) -> Option<SessionInfo>;

    /// Whether a device session is active.
    fn is_connected(&self) -> bool {
        self.session().is_some()
    }
}

#[async_trait]
impl DeviceSink for DeviceHandle {
    async fn send_to_device(&self, bytes: Bytes) -> Result<(), DeviceError> {
        DeviceHandle::send_to_device(self, bytes).await
    }

    fn session(&self) -> Option<SessionInfo> {
        self.session_info()
    }

    fn is_connected(&self) -> bool {
        DeviceHandle::is_connected(self)
    }
}

/// Validates viewer requests and forwards them as `config` commands.
pub struct CommandDispatcher {
    sink: Arc<dyn DeviceSink>,
}

impl CommandDispatcher {
    /// Create a dispatcher that writes to `sink`.
    pub fn new(sink: Arc<dyn DeviceSink>) -> Self {
        Self { sink }
    }

    /// Validate `raw`, encode it, and send it to the device.
    ///
    /// Invalid requests are rejected before the device is contacted.
    /// `NotConnected` and transport failures come back unchanged.
    pub async fn dispatch(&self, raw: &Value) -> Result<Ack, DispatchError> {
        let command = Command::from_request(raw)?;
        let bytes = command
            .encode()
            .map_err(|e| DispatchError::Transport(format!("encode failed: {e}")))?;
        let bytes_sent = bytes.len();
        debug!(rate = command.rate, cycles = command.cycles, bytes = bytes_sent, "dispatching command");

        self.sink.send_to_device(Bytes::from(bytes)).await?;

        info!(rate = command.rate, cycles = command.cycles, "command sent to device");
        Ok(Ack {
            command,
            bytes_sent,
        })
    }

    /// Whether a device session is active.
    pub fn device_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// The active device session, if any.
    pub fn device_session(&self) -> Option<SessionInfo> {
        self.sink.session()
    }
}
