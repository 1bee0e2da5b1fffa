//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, LinearizerConfig, AckConfig)
//! - [`validation`]: Checks run after parsing

mod types;
mod validation;

pub use types::{AckConfig, Config, ConfigError, LinearizerConfig};
pub use validation::{ValidationError, validate};
