//! Bridge configuration
//!
//! Loaded from TOML (`engine_bridge.toml`) with `ENGINE_BRIDGE_*`
//! environment overrides applied on top.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};
use crate::logging::{parse_level, LogConfig, LogFormat, LogOutput};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Log to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_false")]
    pub span_events: bool,

    #[serde(default)]
    pub filter: Option<String>,
}

/// Disposables tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_capacity")]
    pub initial_capacity: usize,

    /// Lock shards; rounded up to a power of two
    #[serde(default = "default_shards")]
    pub shard_amount: usize,

    /// Warn about every live resource during `cleanup`
    #[serde(default = "default_true")]
    pub report_leaks: bool,

    /// Force-dispose live resources during `cleanup`
    #[serde(default = "default_true")]
    pub dispose_leaks: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
            span_events: false,
            filter: None,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_capacity(),
            shard_amount: default_shards(),
            report_leaks: true,
            dispose_leaks: true,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }
fn default_capacity() -> usize { 256 }
fn default_shards() -> usize { 32 }

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        let output = match &self.file {
            Some(path) => LogOutput::File(path.clone()),
            None => LogOutput::Stderr,
        };

        LogConfig {
            level: parse_level(&self.level),
            format: self.format,
            output,
            span_events: self.span_events,
            filter: self.filter.clone(),
        }
    }
}

impl TrackerConfig {
    /// Shard count accepted by `DashMap` (power of two, at least 2)
    pub fn effective_shards(&self) -> usize {
        self.shard_amount.max(2).next_power_of_two()
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BridgeError::Config(format!("failed to parse config: {}", e)))
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `ENGINE_BRIDGE_*` overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("ENGINE_BRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("ENGINE_BRIDGE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }

        if let Some(path) = lookup("ENGINE_BRIDGE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("ENGINE_BRIDGE_REPORT_LEAKS") {
            self.tracker.report_leaks = val == "1" || val.to_lowercase() == "true";
        }
    }
}
