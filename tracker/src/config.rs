//! Tracker configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{LogFormat, TrackerError};

/// Configuration for a tracker pipeline.
///
/// Can be loaded from a TOML file via [`TrackerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Period of the cleanup scheduler, in milliseconds. A block must be
    /// unused for two consecutive ticks before it is unpinned.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Timeout for the header lookup of an `initialized` event that lacks
    /// its block number and parent, in milliseconds.
    #[serde(default = "default_header_timeout_ms")]
    pub header_timeout_ms: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_cleanup_interval_ms() -> u64 {
    1_000
}

fn default_header_timeout_ms() -> u64 {
    10_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl TrackerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, TrackerError> {
        let config: Self = toml::from_str(s).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("TrackerConfig is always serializable to TOML")
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.cleanup_interval_ms == 0 {
            return Err(TrackerError::Config(
                "cleanup_interval_ms must be greater than zero".into(),
            ));
        }
        self.log_format.parse::<LogFormat>()?;
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_millis(self.header_timeout_ms)
    }

    /// Parsed log format; falls back to human output for unknown values.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.parse().unwrap_or(LogFormat::Human)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: default_cleanup_interval_ms(),
            header_timeout_ms: default_header_timeout_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
