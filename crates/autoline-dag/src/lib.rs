//! Causal DAG primitives for multi-writer append logs.
//!
//! Every writer appends to its own log. Each append names the entries it was
//! made on top of, which turns the union of all logs into a directed acyclic
//! graph. This crate stores that graph and nothing more: ordering and
//! finality live in the `autoline` crate on top of it.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                     Dag                      │
//! │  ┌────────────────┐   ┌───────────────────┐  │
//! │  │ Arena<Node>    │◄──│ Writer (per key)  │  │
//! │  │ NodeId handles │   │ retained NodeIds  │  │
//! │  └────────────────┘   └───────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - **[`WriterKey`] / [`EntryRef`]**: stable identities shared by replicas.
//! - **[`Clock`]**: per-writer causal visibility.
//! - **[`NodeId`]**: generational handle; stale after its node is released.
//! - **[`Writer`]**: a log with a compaction offset.

mod arena;
pub mod clock;
pub mod dag;
pub mod error;
pub mod key;
pub mod node;
pub mod writer;

pub use arena::NodeId;
pub use clock::Clock;
pub use dag::{Dag, Released};
pub use error::{DagError, Result};
pub use key::{EntryRef, WriterKey};
pub use node::{Node, NodeState};
pub use writer::Writer;
