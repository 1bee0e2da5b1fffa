//! Leaderless linearization for multi-writer append logs.
//!
//! Each writer appends to its own log, naming the entries it had seen. The
//! [`Linearizer`] turns the resulting causal DAG into one total order that
//! every replica computes identically, and marks a prefix of that order as
//! final once a majority of designated *indexer* writers have acknowledged
//! it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   storage / replication  │   (not part of this crate)
//! └────────────┬─────────────┘
//!              │ create_node / add_head
//!              ▼
//! ┌──────────────────────────────────────────────┐
//! │ Linearizer                                   │
//! │  frontier: heads / tails / merges            │
//! │  confirm:  acks, strictly-newer, quorum      │
//! │  drain:    shift confirmed batches           │
//! │  tip:      speculative order + TipDiff       │
//! │  ack:      should_ack advisory               │
//! └────────────┬─────────────────────────────────┘
//!              │ Update { indexed, tip, shared/popped/pushed }
//!              ▼
//!        view / application
//! ```
//!
//! The graph itself lives in [`autoline_dag`]. Nothing here performs I/O,
//! blocks, or interprets entry values.
//!
//! # Example
//!
//! ```
//! use autoline::{EntryRef, Linearizer};
//! use bytes::Bytes;
//!
//! let mut lin = Linearizer::new(["a"]);
//! lin.append("a", Some(Bytes::from_static(b"hello")), vec![]).unwrap();
//! lin.append("b", Some(Bytes::from_static(b"world")), vec![EntryRef::new("a", 1)]).unwrap();
//!
//! let update = lin.update().unwrap();
//! assert_eq!(update.indexed.len(), 1);
//! assert_eq!(update.tip.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod linearizer;
pub mod shared;
pub mod telemetry;

pub use autoline_dag::{Clock, Dag, DagError, EntryRef, Node, NodeId, NodeState, Writer, WriterKey};
pub use config::{Config, ConfigError, ValidationError};
pub use error::{LinearizerError, Result};
pub use linearizer::{Confirmation, Entry, Linearizer, TipDiff, Update};
pub use shared::SharedLinearizer;
