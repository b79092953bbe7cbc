//! Settings loading: compiled defaults, then the settings file, then
//! `TELEBRIDGE_*` environment overrides.
//!
//! Every settings struct is `#[serde(default)]`, so a partial file fills in
//! from the defaults when deserialized. A `null` in the file means "keep the
//! default" and is dropped before deserializing.
//!
//! Diagnostics go through `tracing`; the binary installs its subscriber
//! before calling [`load_settings_from_path`].

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::BridgeSettings;

const ENV_HOST: &str = "TELEBRIDGE_HOST";
const ENV_DEVICE_PORT: &str = "TELEBRIDGE_DEVICE_PORT";
const ENV_VIEWER_PORT: &str = "TELEBRIDGE_VIEWER_PORT";
const ENV_READ_TIMEOUT_SECS: &str = "TELEBRIDGE_READ_TIMEOUT_SECS";
const ENV_MAX_FRAME_BYTES: &str = "TELEBRIDGE_MAX_FRAME_BYTES";
const ENV_LOG_LEVEL: &str = "TELEBRIDGE_LOG_LEVEL";
const ENV_LOG_JSON: &str = "TELEBRIDGE_LOG_JSON";

const READ_TIMEOUT_SECS: RangeInclusive<u64> = 0..=86_400;
const MAX_FRAME_BYTES: RangeInclusive<usize> = 64..=16 * 1024 * 1024;

/// Resolve the default settings file (`~/.telebridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".telebridge").join("settings.json")
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<BridgeSettings> {
    if !path.exists() {
        debug!(?path, "settings file not found, using defaults");
        return Ok(BridgeSettings::default());
    }

    debug!(?path, "loading settings from file");
    let content = std::fs::read_to_string(path)?;
    let mut file: Value = serde_json::from_str(&content)?;
    drop_nulls(&mut file);
    Ok(serde_json::from_value(file)?)
}

/// Remove `null` members at any depth so the field's default applies.
fn drop_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        map.values_mut().for_each(drop_nulls);
    }
}

/// Apply `TELEBRIDGE_*` environment overrides.
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (the process environment in production).
///
/// Invalid values are logged at `warn` and ignored, keeping the file/default value.
pub fn apply_overrides_from(
    settings: &mut BridgeSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let port = |name: &str| {
        read(name).and_then(|v| accept(name, &v, parse_in_range(&v, 0..=u16::MAX)))
    };

    if let Some(host) = read(ENV_HOST) {
        settings.host = host;
    }
    if let Some(p) = port(ENV_DEVICE_PORT) {
        settings.device.port = p;
    }
    if let Some(p) = port(ENV_VIEWER_PORT) {
        settings.viewer.port = p;
    }
    if let Some(secs) = read(ENV_READ_TIMEOUT_SECS)
        .and_then(|v| accept(ENV_READ_TIMEOUT_SECS, &v, parse_in_range(&v, READ_TIMEOUT_SECS)))
    {
        // 0 disables the timeout
        settings.device.read_timeout_secs = (secs > 0).then_some(secs);
    }
    if let Some(n) = read(ENV_MAX_FRAME_BYTES)
        .and_then(|v| accept(ENV_MAX_FRAME_BYTES, &v, parse_in_range(&v, MAX_FRAME_BYTES)))
    {
        settings.device.max_frame_bytes = n;
    }
    if let Some(level) = read(ENV_LOG_LEVEL) {
        settings.logging.level = level;
    }
    if let Some(json) = read(ENV_LOG_JSON).and_then(|v| accept(ENV_LOG_JSON, &v, parse_bool(&v))) {
        settings.logging.json = json;
    }
}

fn accept<T>(key: &str, value: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key, value, "invalid env var, ignoring");
    }
    parsed
}

/// Parse a switch value: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// case-insensitive.
pub fn parse_bool(val: &str) -> Option<bool> {
    let val = val.trim();
    if ["true", "1", "yes", "on"].iter().any(|t| val.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["false", "0", "no", "off"].iter().any(|f| val.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and keep it only if it lies in `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn apply(pairs: &[(&str, &str)]) -> BridgeSettings {
        let vars = env(pairs);
        let mut settings = BridgeSettings::default();
        apply_overrides_from(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn null_in_file_keeps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"device": {"port": 9100, "commandQueue": null, "readTimeoutSecs": null}, "host": null}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.device.port, 9100);
        assert_eq!(settings.device.command_queue, BridgeSettings::default().device.command_queue);
        assert!(settings.device.read_timeout_secs.is_none());
        assert_eq!(settings.host, "0.0.0.0");
    }

    #[test]
    fn drop_nulls_recurses_into_sections() {
        let mut value = serde_json::json!({"viewer": {"port": null, "maxSendQueue": 16}, "host": null});
        drop_nulls(&mut value);
        assert_eq!(value, serde_json::json!({"viewer": {"maxSendQueue": 16}}));
    }

    #[test]
    fn non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[9000, 5000]").unwrap();
        assert!(matches!(read_file_layer(&path).unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn missing_file_returns_defaults() {
        let settings = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.device.port, 9000);
        assert_eq!(settings.viewer.port, 5000);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"host": "127.0.0.1", "viewer": {"port": 8080}, "logging": {"json": true}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.viewer.port, 8080);
        assert!(settings.logging.json);
        assert_eq!(settings.device.port, 9000);
        assert_eq!(settings.viewer.max_send_queue, 256);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn invalid_combination_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"device": {"port": 7000}, "viewer": {"port": 7000}}"#).unwrap();

        let result = read_file_layer(&path).and_then(|s| s.validate().map(|()| s));
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_ports_and_host() {
        let settings = apply(&[
            ("TELEBRIDGE_HOST", "127.0.0.1"),
            ("TELEBRIDGE_DEVICE_PORT", "9100"),
            ("TELEBRIDGE_VIEWER_PORT", "8080"),
        ]);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.device.port, 9100);
        assert_eq!(settings.viewer.port, 8080);
    }

    #[test]
    fn env_invalid_values_ignored() {
        let settings = apply(&[
            ("TELEBRIDGE_DEVICE_PORT", "not-a-port"),
            ("TELEBRIDGE_VIEWER_PORT", "70000"),
            ("TELEBRIDGE_LOG_JSON", "maybe"),
        ]);
        assert_eq!(settings.device.port, 9000);
        assert_eq!(settings.viewer.port, 5000);
        assert!(!settings.logging.json);
    }

    #[test]
    fn env_read_timeout_zero_disables() {
        let settings = apply(&[("TELEBRIDGE_READ_TIMEOUT_SECS", "45")]);
        assert_eq!(settings.device.read_timeout_secs, Some(45));

        let mut settings = settings;
        apply_overrides_from(&mut settings, |name| {
            (name == "TELEBRIDGE_READ_TIMEOUT_SECS").then(|| "0".to_string())
        });
        assert_eq!(settings.device.read_timeout_secs, None);
    }

    #[test]
    fn env_empty_value_ignored() {
        let settings = apply(&[("TELEBRIDGE_HOST", "")]);
        assert_eq!(settings.host, "0.0.0.0");
    }

    #[test]
    fn env_logging_overrides() {
        let settings = apply(&[
            ("TELEBRIDGE_LOG_LEVEL", "debug"),
            ("TELEBRIDGE_LOG_JSON", "yes"),
            ("TELEBRIDGE_MAX_FRAME_BYTES", "4096"),
        ]);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
        assert_eq!(settings.device.max_frame_bytes, 4096);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true));
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range::<u16>("9000", 0..=u16::MAX), Some(9000));
        assert_eq!(parse_in_range::<u16>("70000", 0..=u16::MAX), None);
        assert_eq!(parse_in_range(" 30 ", READ_TIMEOUT_SECS), Some(30));
        assert_eq!(parse_in_range("86401", READ_TIMEOUT_SECS), None);
        assert_eq!(parse_in_range("32", MAX_FRAME_BYTES), None);
        assert_eq!(parse_in_range("65536", MAX_FRAME_BYTES), Some(65_536));
        assert_eq!(parse_in_range::<usize>("-1", MAX_FRAME_BYTES), None);
    }

    // ── diagnostics ─────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn with_captured_logs(f: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        out.text()
    }

    #[test]
    fn rejected_env_value_is_logged() {
        let logs = with_captured_logs(|| {
            let settings = apply(&[("TELEBRIDGE_DEVICE_PORT", "90000")]);
            assert_eq!(settings.device.port, 9000);
        });
        assert!(logs.contains("invalid env var, ignoring"), "{logs}");
        assert!(logs.contains("TELEBRIDGE_DEVICE_PORT"), "{logs}");
        assert!(logs.contains("90000"), "{logs}");
    }

    #[test]
    fn missing_settings_file_is_logged() {
        let logs = with_captured_logs(|| {
            let _ = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        });
        assert!(logs.contains("settings file not found, using defaults"), "{logs}");
    }
}
