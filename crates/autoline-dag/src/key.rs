//! Writer identities and entry references.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A unique identifier for a writer.
///
/// Wraps the writer's public key rendered as a string. Cloning is cheap.
/// The bytewise ordering of keys is the deterministic tie-break used by
/// every ordering decision in the linearizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "String", into = "String")
)]
pub struct WriterKey(Arc<str>);

impl WriterKey {
    /// Create a new writer key.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Get the inner key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WriterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WriterKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for WriterKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<WriterKey> for String {
    fn from(key: WriterKey) -> Self {
        key.0.to_string()
    }
}

impl Borrow<str> for WriterKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identity of a single entry: a writer and a 1-based position in its log.
///
/// Unlike a [`NodeId`](crate::NodeId), an `EntryRef` means the same thing
/// in every replica, so it is what raw head references, cross-instance
/// comparisons and reports use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryRef {
    /// Writer that appended the entry.
    pub writer: WriterKey,
    /// 1-based position in the writer's log.
    pub length: u64,
}

impl EntryRef {
    /// Create a new entry reference.
    pub fn new(writer: impl Into<WriterKey>, length: u64) -> Self {
        Self {
            writer: writer.into(),
            length,
        }
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.writer, self.length)
    }
}
