//! Configuration validation.
//!
//! Catches indexer lists that would silently change the quorum size.

use super::Config;
use std::collections::BTreeSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("linearizer.indexers[{0}] is empty")]
    EmptyIndexerKey(usize),
    #[error("linearizer.indexers lists '{0}' more than once")]
    DuplicateIndexer(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();

    for (i, key) in config.linearizer.indexers.iter().enumerate() {
        if key.trim().is_empty() {
            errors.push(ValidationError::EmptyIndexerKey(i));
            continue;
        }
        if !seen.insert(key.as_str()) {
            errors.push(ValidationError::DuplicateIndexer(key.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
