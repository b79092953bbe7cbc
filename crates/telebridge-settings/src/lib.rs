//! # telebridge-settings
//!
//! Configuration for the bridge, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Settings file**: JSON, missing or `null` fields keep their defaults
//! 3. **Environment variables**: `TELEBRIDGE_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = BridgeSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.device.port, 9000);
        assert_eq!(settings.viewer.port, 5000);
        assert!(settings.device.read_timeout_secs.is_none());
        assert!(settings.validate().is_ok());
    }
}
