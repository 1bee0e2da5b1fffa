//! Error types for DAG construction.
//!
//! Every variant describes input the producer layer should never have
//! handed over. Nodes that fail these checks are never created.

use thiserror::Error;

use crate::arena::NodeId;
use crate::key::{EntryRef, WriterKey};

/// Convenience type alias for Results using [`DagError`].
pub type Result<T, E = DagError> = std::result::Result<T, E>;

/// Structural errors detected while building the DAG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("unknown writer: {0}")]
    UnknownWriter(WriterKey),

    #[error("writer {writer} expected entry {expected}, got {got}")]
    OutOfOrder {
        writer: WriterKey,
        expected: u64,
        got: u64,
    },

    #[error("dependency {0} is not available yet")]
    MissingDependency(EntryRef),

    #[error("dependency {0} listed more than once")]
    DuplicateDependency(EntryRef),

    #[error("entry cannot depend on its own position: {0}")]
    SelfDependency(EntryRef),

    #[error("batch size must be at least 1, got 0 for {0}")]
    EmptyBatch(EntryRef),

    #[error("unknown or released node: {0:?}")]
    UnknownNode(NodeId),

    #[error("node {0} is already linked")]
    AlreadyLinked(EntryRef),

    #[error("dependency {dependency} of {node} has not been linked")]
    UnlinkedDependency { node: EntryRef, dependency: EntryRef },

    #[error("node {0} cannot be discarded: it is linked, built upon or not its writer's newest")]
    NotDiscardable(EntryRef),

    #[error("writer {writer} has entries referenced by {dependent}")]
    WriterInUse {
        writer: WriterKey,
        dependent: EntryRef,
    },
}

impl DagError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownWriter(_) => "unknown_writer",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::MissingDependency(_) => "missing_dependency",
            Self::DuplicateDependency(_) => "duplicate_dependency",
            Self::SelfDependency(_) => "self_dependency",
            Self::EmptyBatch(_) => "empty_batch",
            Self::UnknownNode(_) => "unknown_node",
            Self::AlreadyLinked(_) => "already_linked",
            Self::UnlinkedDependency { .. } => "unlinked_dependency",
            Self::NotDiscardable(_) => "not_discardable",
            Self::WriterInUse { .. } => "writer_in_use",
        }
    }
}
