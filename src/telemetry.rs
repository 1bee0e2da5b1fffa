//! Tracing helpers.
//!
//! The library never installs a subscriber; embedders choose one.

/// Standardized span constructors for linearizer observability.
pub mod spans {
    use autoline_dag::EntryRef;
    use tracing::{Span, info_span};

    /// Create a span for ingesting one node.
    pub fn ingest(entry: &EntryRef) -> Span {
        info_span!("ingest", entry = %entry)
    }

    /// Create a span for one `update()` pass.
    pub fn update(size: usize, indexers: usize) -> Span {
        info_span!("update", size, indexers)
    }

    /// Create a span for a single shift attempt.
    pub fn shift() -> Span {
        info_span!("shift")
    }
}
