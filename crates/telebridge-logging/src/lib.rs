//! # telebridge-logging
//!
//! `tracing` subscriber setup: an `EnvFilter` built from `RUST_LOG` (or the
//! configured level) and a `fmt` layer that writes either JSON lines or
//! human-readable output to stdout.
//!
//! The binary installs the subscriber before settings are loaded, so settings
//! diagnostics are not lost, then calls [`LoggingGuard::reconfigure`] once the
//! configured level and format are known.

#![deny(unsafe_code)]

use tracing::Level;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, reload};

type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type FormatLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Configuration for the logging subsystem.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default log level. Overridden by the `RUST_LOG` env var.
    pub level: Level,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Build a config from a level name such as `"debug"`. Unknown names fall
    /// back to `INFO`.
    pub fn from_level_name(name: &str, json: bool) -> Self {
        Self {
            level: parse_level(name).unwrap_or(Level::INFO),
            json,
        }
    }

    /// Filter directive string derived from this config, e.g. `debug`.
    pub fn directive(&self) -> String {
        self.level.to_string().to_lowercase()
    }
}

/// Errors from logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
    /// The installed subscriber could not be updated.
    #[error("failed to reconfigure tracing subscriber: {0}")]
    Reload(#[from] reload::Error),
}

/// Handle returned by [`init_logging`]. Keeps the reload handles for the
/// filter and the output format.
pub struct LoggingGuard {
    filter_handle: reload::Handle<EnvFilter, Registry>,
    format_handle: reload::Handle<FormatLayer, FilteredRegistry>,
    from_env: bool,
    filter: String,
    json: bool,
}

impl LoggingGuard {
    /// The filter in effect (from `RUST_LOG` when set, otherwise the config).
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Whether output is JSON lines.
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Apply `config` to the running subscriber. A `RUST_LOG` filter given at
    /// startup stays in effect; the output format always follows `config`.
    pub fn reconfigure(&mut self, config: &LoggingConfig) -> Result<(), LoggingError> {
        if !self.from_env {
            let directive = config.directive();
            if directive != self.filter {
                self.filter_handle.reload(EnvFilter::new(&directive))?;
                self.filter = directive;
            }
        }
        if config.json != self.json {
            self.format_handle.reload(format_layer(config.json))?;
            self.json = config.json;
        }
        Ok(())
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let env_directive = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty());
    init_logging_with(config, env_directive)
}

/// Like [`init_logging`], with an explicit `RUST_LOG`-style directive in place
/// of the environment.
pub fn init_logging_with(
    config: &LoggingConfig,
    env_directive: Option<String>,
) -> Result<LoggingGuard, LoggingError> {
    let env_filter = env_directive.and_then(|d| EnvFilter::try_new(d).ok());
    let from_env = env_filter.is_some();
    let env_filter = env_filter.unwrap_or_else(|| EnvFilter::new(config.directive()));
    let filter = env_filter.to_string();

    let (filter_layer, filter_handle) = reload::Layer::new(env_filter);
    let (format, format_handle) = reload::Layer::new(format_layer(config.json));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(format)
        .try_init()?;

    Ok(LoggingGuard {
        filter_handle,
        format_handle,
        from_env,
        filter,
        json: config.json,
    })
}

fn format_layer(json: bool) -> FormatLayer {
    if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    }
}

/// Parse a level name (case-insensitive).
pub fn parse_level(name: &str) -> Option<Level> {
    name.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_is_info() {
        assert_eq!(LoggingConfig::default().directive(), "info");
    }

    #[test]
    fn directive_follows_level() {
        let config = LoggingConfig {
            level: Level::WARN,
            json: false,
        };
        assert_eq!(config.directive(), "warn");
    }

    #[test]
    fn from_level_name_parses_or_falls_back() {
        assert_eq!(LoggingConfig::from_level_name("DEBUG", true).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_level_name("chatty", false).level, Level::INFO);
        assert!(LoggingConfig::from_level_name("info", true).json);
    }

    #[test]
    fn parse_level_names() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level(" Error "), Some(Level::ERROR));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn directive_is_a_valid_filter() {
        let config = LoggingConfig::from_level_name("trace", false);
        assert!(EnvFilter::try_new(config.directive()).is_ok());
    }
}
