//! `/health` endpoint.

use std::net::SocketAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use telebridge_core::DeviceStatus;
use telebridge_device::SessionInfo;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connected viewers.
    pub viewers: usize,
    /// Whether a device session is active.
    pub device_connected: bool,
    /// Machine-readable device link state.
    pub device_status: &'static str,
    /// Remote address of the connected device.
    pub device_remote: Option<SocketAddr>,
    /// When the current device session was accepted (RFC 3339).
    pub device_connected_at: Option<DateTime<Utc>>,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    viewers: usize,
    session: Option<&SessionInfo>,
    device_status: &DeviceStatus,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        viewers,
        device_connected: session.is_some(),
        device_status: device_status.kind(),
        device_remote: session.map(|s| s.remote),
        device_connected_at: session.map(|s| s.connected_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, None, &DeviceStatus::AwaitingDevice);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let resp = health_check(start, 0, None, &DeviceStatus::AwaitingDevice);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization_with_session() {
        let session = SessionInfo {
            id: 3,
            remote: "192.168.4.1:50123".parse().unwrap(),
            connected_at: "2026-03-01T12:00:00Z".parse().unwrap(),
        };
        let resp = health_check(Instant::now(), 3, Some(&session), &DeviceStatus::Receiving);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["viewers"], 3);
        assert_eq!(parsed["device_connected"], true);
        assert_eq!(parsed["device_status"], "receiving");
        assert_eq!(parsed["device_remote"], "192.168.4.1:50123");
        assert_eq!(parsed["device_connected_at"], "2026-03-01T12:00:00Z");
        assert!(parsed["uptime_secs"].is_number());
    }

    #[test]
    fn no_session_serializes_nulls() {
        let resp = health_check(Instant::now(), 0, None, &DeviceStatus::Disconnected);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["device_connected"], false);
        assert!(parsed["device_remote"].is_null());
        assert!(parsed["device_connected_at"].is_null());
    }
}
