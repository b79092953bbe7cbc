//! Merged telemetry state and device link status.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Number;

/// Key under which the link status is serialized. Devices cannot set it.
pub const STATUS_KEY: &str = "status";

/// Key holding the device-reported timestamp.
pub const TIME_KEY: &str = "time";

/// Numeric telemetry fields, keyed by the name the device reports.
pub type Fields = BTreeMap<String, Number>;

/// Link state between the bridge and the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Listening, no device has connected yet.
    AwaitingDevice,
    /// A device session was just accepted from this address.
    Connected(SocketAddr),
    /// At least one frame has been merged from the current session.
    Receiving,
    /// The last session ended; listening again.
    Disconnected,
    /// The device listener could not start.
    StartupFailed(String),
}

impl DeviceStatus {
    /// Short machine-readable name, used in logs and `/health`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AwaitingDevice => "awaiting_device",
            Self::Connected(_) => "connected",
            Self::Receiving => "receiving",
            Self::Disconnected => "disconnected",
            Self::StartupFailed(_) => "startup_failed",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingDevice => f.write_str("awaiting device connection"),
            Self::Connected(addr) => write!(f, "device connected: {}", addr.ip()),
            Self::Receiving => f.write_str("receiving data"),
            Self::Disconnected => f.write_str("device disconnected"),
            Self::StartupFailed(reason) => write!(f, "startup failed: {reason}"),
        }
    }
}

/// Full telemetry state as pushed to viewers.
///
/// Serializes as a flat object: every field plus `status` as display text.
/// The revision is internal and never serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    fields: Fields,
    status: DeviceStatus,
    revision: u64,
}

impl Snapshot {
    /// Snapshot before any device has reported.
    pub fn initial() -> Self {
        let mut fields = Fields::new();
        for key in ["DC", "Amp", "Freq"] {
            let _ = fields.insert(key.to_owned(), zero_float());
        }
        let _ = fields.insert(TIME_KEY.to_owned(), Number::from(0_u64));
        Self {
            fields,
            status: DeviceStatus::AwaitingDevice,
            revision: 0,
        }
    }

    /// All telemetry fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// One field as `f64`.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Number::as_f64)
    }

    /// Current link status.
    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    /// Store revision this snapshot was taken at. Strictly increases per mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn overlay(&mut self, fields: Fields) {
        for (key, value) in fields {
            if key == STATUS_KEY {
                continue;
            }
            let _ = self.fields.insert(key, value);
        }
    }

    pub(crate) fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::initial()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(STATUS_KEY, &self.status.to_string())?;
        map.end()
    }
}

fn zero_float() -> Number {
    Number::from_f64(0.0).unwrap_or_else(|| Number::from(0_u64))
}
