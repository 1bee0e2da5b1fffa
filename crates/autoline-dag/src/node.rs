//! DAG vertices.

use bytes::Bytes;

use crate::arena::NodeId;
use crate::clock::Clock;
use crate::key::{EntryRef, WriterKey};

/// Lifecycle of a node inside the [`Dag`](crate::Dag).
///
/// Yielded nodes are not represented: yielding releases the arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created by the writer but not yet handed to the linearizer.
    Pending,
    /// Part of the live DAG.
    Linked,
}

/// One writer's append, with its resolved causal parents.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) writer: WriterKey,
    pub(crate) length: u64,
    pub(crate) value: Option<Bytes>,
    pub(crate) heads: Vec<EntryRef>,
    pub(crate) dependencies: Vec<NodeId>,
    pub(crate) dependents: Vec<NodeId>,
    pub(crate) clock: Clock,
    pub(crate) batch: u32,
    pub(crate) state: NodeState,
}

impl Node {
    /// Writer that appended this entry.
    #[must_use]
    pub fn writer(&self) -> &WriterKey {
        &self.writer
    }

    /// 1-based position in the writer's log.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Payload, or `None` for an ack-only entry.
    #[must_use]
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// Raw head references this entry was appended on top of.
    #[must_use]
    pub fn heads(&self) -> &[EntryRef] {
        &self.heads
    }

    /// Live causal parents. Shrinks as parents are yielded.
    #[must_use]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Nodes that list this one as a parent.
    #[must_use]
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Everything this entry has causally seen, itself included.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Entries remaining in this entry's batch, itself included.
    ///
    /// `1` closes a batch; a standalone entry is a batch of one.
    #[must_use]
    pub fn batch(&self) -> u32 {
        self.batch
    }

    /// Returns `true` when more entries of the same batch follow.
    #[must_use]
    pub fn continues_batch(&self) -> bool {
        self.batch > 1
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Returns `true` once the node has been linked into the live DAG.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.state == NodeState::Linked
    }

    /// Returns `true` for entries without dependencies (tails).
    #[must_use]
    pub fn is_tail(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Returns `true` for entries joining several live branches.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.dependencies.len() > 1
    }

    /// Identity of this entry.
    #[must_use]
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            writer: self.writer.clone(),
            length: self.length,
        }
    }

    /// Returns `true` if this node has causally seen `other`.
    #[must_use]
    pub fn sees(&self, other: &Node) -> bool {
        self.clock.includes(&other.writer, other.length)
    }
}
