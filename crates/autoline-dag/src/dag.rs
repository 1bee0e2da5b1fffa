//! Node storage and edge bookkeeping.
//!
//! The [`Dag`] owns every live node and the writer registry. It resolves raw
//! head references into node edges when an entry is created, and it is the
//! only place edges are added or removed, so the forward (`dependents`) and
//! backward (`dependencies`) lists can never disagree.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use tracing::trace;

use crate::arena::{Arena, NodeId};
use crate::clock::Clock;
use crate::error::{DagError, Result};
use crate::key::{EntryRef, WriterKey};
use crate::node::{Node, NodeState};
use crate::writer::Writer;

/// A node removed from the arena, plus the edges its removal freed.
#[derive(Debug)]
pub struct Released {
    /// Id the node had while it was stored.
    pub id: NodeId,
    /// The node itself.
    pub node: Node,
    /// Linked dependents left without any dependency.
    pub orphaned: Vec<NodeId>,
}

/// Arena of causal nodes plus the writers that produced them.
#[derive(Debug, Default)]
pub struct Dag {
    nodes: Arena<Node>,
    writers: BTreeMap<WriterKey, Writer>,
}

impl Dag {
    /// Create an empty DAG.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes (pending and linked).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    /// Register a writer with an empty log. Idempotent.
    pub fn add_writer(&mut self, key: WriterKey) -> &mut Writer {
        self.add_writer_at(key, 0)
    }

    /// Register a writer whose first `offset` entries were finalized in an
    /// earlier session and are not retained. Idempotent; an existing writer
    /// keeps its offset.
    pub fn add_writer_at(&mut self, key: WriterKey, offset: u64) -> &mut Writer {
        self.writers
            .entry(key.clone())
            .or_insert_with(|| Writer::new(key, offset))
    }

    /// Look up a writer.
    #[must_use]
    pub fn writer(&self, key: &WriterKey) -> Option<&Writer> {
        self.writers.get(key)
    }

    /// All registered writers in key order.
    pub fn writers(&self) -> impl Iterator<Item = &Writer> {
        self.writers.values()
    }

    /// Flag a writer as an active indexer (registering it if needed).
    pub fn set_indexer(&mut self, key: &WriterKey, indexer: bool) {
        self.add_writer(key.clone()).set_indexer(indexer);
    }

    /// Resolve a node id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Resolve a node id, failing on stale ids.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(DagError::UnknownNode(id))
    }

    /// Node at 0-based sequence `seq` of `writer`, if retained.
    #[must_use]
    pub fn node_at(&self, writer: &WriterKey, seq: u64) -> Option<NodeId> {
        self.writers.get(writer).and_then(|w| w.get(seq))
    }

    /// Create a node for `writer` at position `length`.
    ///
    /// `heads` are the raw entries the append was made on top of. Each one is
    /// resolved to a retained node or, when it lies at or below the writer's
    /// compaction boundary, folded into the clock only. The writer's previous
    /// entry is always treated as a parent, and parents already covered by
    /// another parent's clock are dropped.
    pub fn create_node(
        &mut self,
        writer: &WriterKey,
        length: u64,
        value: Option<Bytes>,
        heads: Vec<EntryRef>,
        batch: u32,
    ) -> Result<NodeId> {
        let log = self
            .writers
            .get(writer)
            .ok_or_else(|| DagError::UnknownWriter(writer.clone()))?;

        let expected = log.length() + 1;
        if length != expected {
            return Err(DagError::OutOfOrder {
                writer: writer.clone(),
                expected,
                got: length,
            });
        }

        let me = EntryRef::new(writer.clone(), length);
        if batch == 0 {
            return Err(DagError::EmptyBatch(me));
        }

        let mut clock = Clock::new();
        let mut dependencies = Vec::with_capacity(heads.len() + 1);
        let mut listed = BTreeSet::new();

        for head in &heads {
            if !listed.insert(head.clone()) {
                return Err(DagError::DuplicateDependency(head.clone()));
            }
            if head.writer == *writer && head.length >= length {
                return Err(DagError::SelfDependency(head.clone()));
            }

            match self.resolve(head)? {
                Some(id) => dependencies.push(id),
                None => clock.observe(&head.writer, head.length),
            }
        }

        if length > 1 && !listed.contains(&EntryRef::new(writer.clone(), length - 1)) {
            match log.get(length - 2) {
                Some(prev) => dependencies.push(prev),
                None => clock.observe(writer, length - 1),
            }
        }

        let dependencies = self.antichain(dependencies);
        for &dep in &dependencies {
            if let Some(parent) = self.nodes.get(dep) {
                clock.merge(&parent.clock);
            }
        }
        clock.observe(writer, length);

        let id = self.nodes.insert(Node {
            writer: writer.clone(),
            length,
            value,
            heads,
            dependencies: dependencies.clone(),
            dependents: Vec::new(),
            clock,
            batch,
            state: NodeState::Pending,
        });

        for dep in dependencies {
            if let Some(parent) = self.nodes.get_mut(dep) {
                parent.dependents.push(id);
            }
        }

        if let Some(log) = self.writers.get_mut(writer) {
            log.push(id);
        }

        trace!(entry = %me, ?id, "created node");
        Ok(id)
    }

    /// Map a raw head reference to a retained node, or `None` if the
    /// referenced position is already finalized.
    fn resolve(&self, head: &EntryRef) -> Result<Option<NodeId>> {
        let missing = || DagError::MissingDependency(head.clone());

        let log = self.writers.get(&head.writer).ok_or_else(missing)?;
        if head.length == 0 || head.length > log.length() {
            return Err(missing());
        }
        if head.length <= log.indexed_offset() {
            return Ok(None);
        }
        log.get(head.length - 1).map(Some).ok_or_else(missing)
    }

    /// Drop every dependency that another dependency has already seen.
    fn antichain(&self, mut dependencies: Vec<NodeId>) -> Vec<NodeId> {
        let snapshot = dependencies.clone();
        dependencies.retain(|&dep| {
            let Some(node) = self.nodes.get(dep) else {
                return false;
            };
            !snapshot.iter().any(|&other| {
                other != dep
                    && self
                        .nodes
                        .get(other)
                        .is_some_and(|o| o.clock.includes(&node.writer, node.length))
            })
        });
        dependencies
    }

    /// Mark a pending node as part of the live DAG.
    ///
    /// Every remaining dependency must already be linked.
    pub fn link(&mut self, id: NodeId) -> Result<&Node> {
        let node = self.nodes.get(id).ok_or(DagError::UnknownNode(id))?;
        if node.is_linked() {
            return Err(DagError::AlreadyLinked(node.entry_ref()));
        }

        for &dep in &node.dependencies {
            let parent = self.nodes.get(dep).ok_or(DagError::UnknownNode(dep))?;
            if !parent.is_linked() {
                return Err(DagError::UnlinkedDependency {
                    node: node.entry_ref(),
                    dependency: parent.entry_ref(),
                });
            }
        }

        let node = self.nodes.get_mut(id).ok_or(DagError::UnknownNode(id))?;
        node.state = NodeState::Linked;
        Ok(node)
    }

    /// Remove a finalized node, compacting its writer's log and detaching
    /// it from its neighbours.
    pub fn release(&mut self, id: NodeId) -> Result<Released> {
        let node = self.nodes.remove(id).ok_or(DagError::UnknownNode(id))?;

        if let Some(log) = self.writers.get_mut(&node.writer) {
            let compacted = log.compact_front(id);
            debug_assert!(compacted, "entries must be released in log order");
        }

        let mut orphaned = Vec::new();
        for &child in &node.dependents {
            if let Some(dependent) = self.nodes.get_mut(child) {
                dependent.dependencies.retain(|&d| d != id);
                if dependent.dependencies.is_empty() && dependent.is_linked() {
                    orphaned.push(child);
                }
            }
        }
        for &parent in &node.dependencies {
            if let Some(dependency) = self.nodes.get_mut(parent) {
                dependency.dependents.retain(|&d| d != id);
            }
        }

        Ok(Released {
            id,
            node,
            orphaned,
        })
    }

    /// Undo [`create_node`](Self::create_node) for a node that never made it
    /// into the live DAG.
    ///
    /// Only a pending node that is its writer's newest entry and that nothing
    /// builds on can be discarded.
    pub fn discard(&mut self, id: NodeId) -> Result<Node> {
        let node = self.nodes.get(id).ok_or(DagError::UnknownNode(id))?;
        let is_newest = self
            .writers
            .get(&node.writer)
            .and_then(Writer::head)
            .is_some_and(|head| head == id);
        if node.is_linked() || !node.dependents.is_empty() || !is_newest {
            return Err(DagError::NotDiscardable(node.entry_ref()));
        }

        let node = self.nodes.remove(id).ok_or(DagError::UnknownNode(id))?;
        if let Some(log) = self.writers.get_mut(&node.writer) {
            log.pop_back(id);
        }
        for &parent in &node.dependencies {
            if let Some(dependency) = self.nodes.get_mut(parent) {
                dependency.dependents.retain(|&d| d != id);
            }
        }

        trace!(entry = %node.entry_ref(), ?id, "discarded node");
        Ok(node)
    }

    /// Drop a writer and every entry of it that is still retained.
    ///
    /// Fails without changing anything if another writer's entry depends on
    /// one of them.
    pub fn remove_writer(&mut self, key: &WriterKey) -> Result<Vec<Released>> {
        let log = self
            .writers
            .get(key)
            .ok_or_else(|| DagError::UnknownWriter(key.clone()))?;

        for id in log.nodes() {
            let node = self.nodes.get(id).ok_or(DagError::UnknownNode(id))?;
            for &child in &node.dependents {
                let Some(dependent) = self.nodes.get(child) else {
                    continue;
                };
                if dependent.writer != *key {
                    return Err(DagError::WriterInUse {
                        writer: key.clone(),
                        dependent: dependent.entry_ref(),
                    });
                }
            }
        }

        let ids = self
            .writers
            .get_mut(key)
            .map(Writer::drain)
            .unwrap_or_default();
        self.writers.remove(key);

        let mut purged = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            for &parent in &node.dependencies {
                if let Some(dependency) = self.nodes.get_mut(parent) {
                    dependency.dependents.retain(|&d| d != id);
                }
            }
            purged.push(Released {
                id,
                node,
                orphaned: Vec::new(),
            });
        }

        Ok(purged)
    }
}
