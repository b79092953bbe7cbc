//! Connection manager configuration.

use std::time::Duration;

use telebridge_core::frame::DEFAULT_MAX_FRAME_BYTES;

/// Configuration for the device listener.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks an ephemeral port).
    pub port: u16,
    /// End the session when no bytes arrive for this long.
    pub read_timeout: Option<Duration>,
    /// Largest partial frame kept while waiting for the rest.
    pub max_frame_bytes: usize,
    /// Buffer space reserved before each read.
    pub read_buffer_bytes: usize,
    /// Capacity of the outbound command queue.
    pub command_queue: usize,
    /// Give up on a single command write after this long.
    pub write_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9000,
            read_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            read_buffer_bytes: 1024,
            command_queue: 32,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl DeviceConfig {
    /// `host:port` string passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
