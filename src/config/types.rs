//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Quorum and update settings.
    #[serde(default)]
    pub linearizer: LinearizerConfig,
    /// Acknowledgement advisory settings.
    #[serde(default)]
    pub ack: AckConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Linearizer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearizerConfig {
    /// Writer keys whose acknowledgements count toward quorum.
    /// An empty list means nothing is ever finalized.
    #[serde(default)]
    pub indexers: Vec<String>,
    /// Maximum batches finalized by a single `update()` (default: 0, unlimited).
    /// Remaining confirmed batches are picked up by the next call.
    #[serde(default = "default_max_batches_per_update")]
    pub max_batches_per_update: usize,
}

impl Default for LinearizerConfig {
    fn default() -> Self {
        Self {
            indexers: Vec::new(),
            max_batches_per_update: default_max_batches_per_update(),
        }
    }
}

fn default_max_batches_per_update() -> usize {
    0
}

/// Acknowledgement advisory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AckConfig {
    /// Whether `should_ack` may ever answer `true` (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}
