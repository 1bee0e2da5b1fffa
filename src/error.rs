//! Error handling for the linearizer.
//!
//! Structural problems with a node are reported by the DAG layer and wrapped
//! here. "Not yet confirmable" is never an error: it is the normal state of
//! every speculative entry.

use autoline_dag::{DagError, EntryRef, NodeId, WriterKey};
use thiserror::Error;

/// Convenience type alias for Results using [`LinearizerError`].
pub type Result<T, E = LinearizerError> = std::result::Result<T, E>;

// ============================================================================
// Linearizer Errors (ingestion and writer management)
// ============================================================================

/// Errors returned by [`Linearizer`](crate::Linearizer) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinearizerError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error("dependency {dependency} of {node} must be added as a head first")]
    DependencyNotLinked { node: EntryRef, dependency: EntryRef },

    #[error("node {0:?} was already yielded or never created")]
    UnknownNode(NodeId),

    #[error("writer {0} is not registered")]
    UnknownWriter(WriterKey),
}

impl LinearizerError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Dag(err) => err.error_code(),
            Self::DependencyNotLinked { .. } => "dependency_not_linked",
            Self::UnknownNode(_) => "unknown_node",
            Self::UnknownWriter(_) => "unknown_writer",
        }
    }

    /// Returns `true` when the rejected input can succeed later, once the
    /// entries it depends on have been ingested.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DependencyNotLinked { .. } | Self::Dag(DagError::MissingDependency(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dag_errors_keep_their_code() {
        let err: LinearizerError = DagError::DuplicateDependency(EntryRef::new("a", 1)).into();
        assert_eq!(err.error_code(), "duplicate_dependency");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_inputs_are_retryable() {
        let missing: LinearizerError = DagError::MissingDependency(EntryRef::new("a", 3)).into();
        assert!(missing.is_retryable());

        let unlinked = LinearizerError::DependencyNotLinked {
            node: EntryRef::new("b", 1),
            dependency: EntryRef::new("a", 1),
        };
        assert!(unlinked.is_retryable());
        assert_eq!(
            unlinked.to_string(),
            "dependency a:1 of b:1 must be added as a head first"
        );
    }
}
