//! Viewer commands and their device encoding.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::DispatchError;

/// A validated `config` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    /// Sampling rate requested from the device.
    pub rate: u32,
    /// Number of measurement cycles.
    pub cycles: u32,
}

/// Successful hand-off of a command to the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    /// The command that was sent.
    pub command: Command,
    /// Bytes written to the device.
    pub bytes_sent: usize,
}

#[derive(Serialize)]
struct WireCommand {
    cmd: &'static str,
    rate: u32,
    cycles: u32,
}

impl Command {
    /// Validate a raw viewer request body.
    ///
    /// `rate` and `cycles` must both be present and coercible to a
    /// non-negative integer that fits in `u32`: an unsigned JSON integer, an
    /// integral non-negative float, or a string of decimal digits.
    pub fn from_request(raw: &Value) -> Result<Self, DispatchError> {
        let Value::Object(body) = raw else {
            return Err(DispatchError::Rejected(
                "request body must be a JSON object".into(),
            ));
        };
        Ok(Self {
            rate: coerce_count(body, "rate")?,
            cycles: coerce_count(body, "cycles")?,
        })
    }

    /// Encode for the device: compact `{"cmd":"config","rate":..,"cycles":..}`
    /// with no trailing delimiter.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireCommand {
            cmd: "config",
            rate: self.rate,
            cycles: self.cycles,
        })
    }
}

fn coerce_count(body: &Map<String, Value>, key: &str) -> Result<u32, DispatchError> {
    let value = body
        .get(key)
        .ok_or_else(|| DispatchError::Rejected(format!("missing field `{key}`")))?;

    let parsed = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral_float)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            DispatchError::Rejected(format!(
                "`{key}` must be a non-negative integer, got {value}"
            ))
        })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integral_float(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract().abs() < f64::EPSILON && f <= f64::from(u32::MAX))
        .then_some(f as u64)
}
