//! Leaderless linearization of a multi-writer causal DAG.
//!
//! The [`Linearizer`] tracks the live frontier of the DAG (heads, tails and
//! merges), finalizes entries once a majority of indexers has acknowledged
//! them, and computes a deterministic speculative order for the rest.
//!
//! ```text
//!   create_node ──► add_head ──► update ──► Update { indexed, tip, diff }
//!                                  │
//!                                  ├─ shift (confirmed batches, final)
//!                                  └─ tip order (speculative)
//! ```
//!
//! Every set the linearizer iterates is keyed by [`EntryRef`], never by
//! arena slot, so two instances holding the same nodes make the same choices
//! regardless of the order the nodes arrived in.

mod ack;
mod confirm;
mod drain;
mod tip;

use std::collections::BTreeMap;

use autoline_dag::{Clock, Dag, DagError, EntryRef, Node, NodeId, Writer, WriterKey};
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{LinearizerError, Result};
use crate::telemetry::spans;

pub use confirm::Confirmation;
pub use tip::{Entry, TipDiff, Update};

/// Deterministic linearizer and majority-quorum confirmation engine.
#[derive(Debug)]
pub struct Linearizer {
    dag: Dag,
    indexers: Vec<WriterKey>,
    majority: usize,
    heads: BTreeMap<EntryRef, NodeId>,
    tails: BTreeMap<EntryRef, NodeId>,
    merges: BTreeMap<EntryRef, NodeId>,
    removed: Clock,
    size: usize,
    indexed_heads: Vec<EntryRef>,
    tip: Vec<EntryRef>,
    dirty: bool,
    max_batches_per_update: usize,
    acks_enabled: bool,
}

impl Default for Linearizer {
    fn default() -> Self {
        Self::new(std::iter::empty::<WriterKey>())
    }
}

impl Linearizer {
    /// Create a linearizer voting with the given indexer keys.
    pub fn new<I, K>(indexers: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<WriterKey>,
    {
        let mut linearizer = Self {
            dag: Dag::new(),
            indexers: Vec::new(),
            majority: 1,
            heads: BTreeMap::new(),
            tails: BTreeMap::new(),
            merges: BTreeMap::new(),
            removed: Clock::new(),
            size: 0,
            indexed_heads: Vec::new(),
            tip: Vec::new(),
            dirty: false,
            max_batches_per_update: 0,
            acks_enabled: true,
        };
        linearizer.set_indexers(indexers);
        linearizer
    }

    /// Create a linearizer from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut linearizer = Self::new(config.linearizer.indexers.iter().map(String::as_str));
        linearizer.max_batches_per_update = config.linearizer.max_batches_per_update;
        linearizer.acks_enabled = config.ack.enabled;
        linearizer
    }

    // ========================================================================
    // Writers and indexers
    // ========================================================================

    /// Register a writer with an empty log. Idempotent.
    pub fn add_writer(&mut self, key: impl Into<WriterKey>) {
        self.add_writer_at(key, 0);
    }

    /// Register a writer resuming from a compacted log whose first
    /// `indexed_offset` entries are already final. Idempotent: an existing
    /// writer keeps its current state.
    pub fn add_writer_at(&mut self, key: impl Into<WriterKey>, indexed_offset: u64) {
        let key = key.into();
        if self.dag.writer(&key).is_some() {
            return;
        }

        self.dag.add_writer_at(key.clone(), indexed_offset);
        self.dag.set_indexer(&key, self.indexers.contains(&key));
        if indexed_offset > 0 {
            self.removed.observe(&key, indexed_offset);
        }
        debug!(writer = %key, indexed_offset, "writer added");
    }

    /// Replace the indexer set.
    ///
    /// The majority is recomputed immediately and the next `update()` re-runs
    /// confirmation against the new set.
    pub fn set_indexers<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<WriterKey>,
    {
        let mut indexers: Vec<WriterKey> = keys.into_iter().map(Into::into).collect();
        indexers.sort();
        indexers.dedup();

        let registered: Vec<WriterKey> = self.dag.writers().map(|w| w.key().clone()).collect();
        for key in registered {
            self.dag.set_indexer(&key, indexers.binary_search(&key).is_ok());
        }

        self.majority = indexers.len() / 2 + 1;
        self.indexers = indexers;
        self.dirty = true;
        debug!(
            indexers = self.indexers.len(),
            majority = self.majority,
            "indexer set replaced"
        );
    }

    /// Drop a writer together with all of its not-yet-final entries.
    ///
    /// Returns the number of entries purged. Fails without changing anything
    /// if another writer's entry depends on one of them.
    pub fn remove_writer(&mut self, key: &WriterKey) -> Result<usize> {
        if self.dag.writer(key).is_none() {
            return Err(LinearizerError::UnknownWriter(key.clone()));
        }

        let purged = self.dag.remove_writer(key)?;
        let mut count = 0;

        for released in &purged {
            let entry = released.node.entry_ref();
            self.heads.remove(&entry);
            self.tails.remove(&entry);
            self.merges.remove(&entry);
            if released.node.is_linked() {
                self.size -= 1;
            }
            count += 1;
        }

        // parents left without a linked dependent are frontier again
        for released in &purged {
            for &parent in released.node.dependencies() {
                let Some(node) = self.dag.get(parent) else {
                    continue;
                };
                if node.is_linked() && !self.has_linked_dependent(node) {
                    self.heads.insert(node.entry_ref(), parent);
                }
            }
        }

        if let Ok(i) = self.indexers.binary_search(key) {
            self.indexers.remove(i);
            self.majority = self.indexers.len() / 2 + 1;
        }
        // a writer added again under this key starts over
        self.removed.remove(key);

        self.dirty = true;
        debug!(writer = %key, purged = count, "writer removed");
        Ok(count)
    }

    fn has_linked_dependent(&self, node: &Node) -> bool {
        node.dependents()
            .iter()
            .filter_map(|&id| self.dag.get(id))
            .any(Node::is_linked)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Create a pending node. See [`Dag::create_node`].
    pub fn create_node(
        &mut self,
        writer: &WriterKey,
        length: u64,
        value: Option<Bytes>,
        heads: Vec<EntryRef>,
        batch: u32,
    ) -> Result<NodeId> {
        Ok(self.dag.create_node(writer, length, value, heads, batch)?)
    }

    /// Append a single entry on top of `heads` and ingest it.
    ///
    /// `None` appends an ack-only entry. On error nothing is kept, so a
    /// retryable failure can simply be retried.
    pub fn append(
        &mut self,
        writer: impl Into<WriterKey>,
        value: Option<Bytes>,
        heads: Vec<EntryRef>,
    ) -> Result<NodeId> {
        let writer = writer.into();
        self.add_writer(writer.clone());

        let length = self.next_length(&writer);
        let id = self.create_node(&writer, length, value, heads, 1)?;
        self.add_head(id).inspect_err(|_| self.discard(&[id]))
    }

    /// Append several values as one atomic batch and ingest them.
    ///
    /// Only the first entry carries `heads`; the rest chain onto it. On error
    /// none of the batch is kept.
    pub fn append_batch(
        &mut self,
        writer: impl Into<WriterKey>,
        values: Vec<Bytes>,
        heads: Vec<EntryRef>,
    ) -> Result<Vec<NodeId>> {
        let writer = writer.into();
        self.add_writer(writer.clone());

        let total = u32::try_from(values.len()).unwrap_or(u32::MAX);
        let mut heads = Some(heads);
        let mut ids = Vec::with_capacity(values.len());

        for (i, value) in values.into_iter().enumerate() {
            let remaining = total - i as u32;
            let length = self.next_length(&writer);
            let created = self.create_node(
                &writer,
                length,
                Some(value),
                heads.take().unwrap_or_default(),
                remaining,
            );
            match created {
                Ok(id) => ids.push(id),
                Err(err) => {
                    self.discard(&ids);
                    return Err(err);
                }
            }
        }

        for (i, &id) in ids.iter().enumerate() {
            if let Err(err) = self.add_head(id) {
                self.discard(&ids[i..]);
                return Err(err);
            }
        }
        Ok(ids)
    }

    /// Drop pending nodes created by a failed append, newest first, so the
    /// writer's next position is free for the retry.
    fn discard(&mut self, ids: &[NodeId]) {
        for &id in ids.iter().rev() {
            if let Err(err) = self.dag.discard(id) {
                warn!(error = %err, code = err.error_code(), "failed to roll back node");
            }
        }
    }

    fn next_length(&self, writer: &WriterKey) -> u64 {
        self.dag.writer(writer).map_or(1, |w| w.length() + 1)
    }

    /// Link a pending node into the live DAG.
    pub fn add_head(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self
            .dag
            .get(id)
            .ok_or(LinearizerError::UnknownNode(id))?;
        let _span = spans::ingest(&node.entry_ref()).entered();

        let node = match self.dag.link(id) {
            Ok(node) => node,
            Err(DagError::UnlinkedDependency { node, dependency }) => {
                return Err(LinearizerError::DependencyNotLinked { node, dependency });
            }
            Err(err) => return Err(err.into()),
        };

        let entry = node.entry_ref();
        let clock = node.clock().clone();
        let is_tail = node.is_tail();
        let is_merge = node.is_merge();

        if is_tail {
            self.tails.insert(entry.clone(), id);
        }
        self.heads.retain(|head, _| !clock.includes_ref(head));
        if is_merge {
            self.merges.insert(entry.clone(), id);
        }
        self.heads.insert(entry, id);

        self.size += 1;
        self.dirty = true;
        trace!(tail = is_tail, merge = is_merge, heads = self.heads.len(), "head added");
        Ok(id)
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Finalize whatever is confirmed and recompute the speculative tip.
    ///
    /// Returns `None` when nothing was ingested since the last call or when
    /// the output did not change.
    pub fn update(&mut self) -> Option<Update> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        let _span = spans::update(self.size, self.indexers.len()).entered();

        let mut indexed = Vec::new();
        let mut batches = 0;
        loop {
            if self.max_batches_per_update > 0 && batches >= self.max_batches_per_update {
                // more may be confirmed; resume on the next call
                self.dirty = true;
                break;
            }
            let batch = self.shift_batch();
            if batch.is_empty() {
                break;
            }
            indexed.extend(batch);
            batches += 1;
        }

        let tip = self.tip_entries();
        let next: Vec<EntryRef> = indexed
            .iter()
            .chain(tip.iter())
            .map(|e| e.entry.clone())
            .collect();
        let diff = TipDiff::between(&self.tip, &next);
        self.tip = tip.iter().map(|e| e.entry.clone()).collect();

        if indexed.is_empty() && diff.is_unchanged() {
            return None;
        }

        debug!(
            indexed = indexed.len(),
            tip = tip.len(),
            shared = diff.shared,
            popped = diff.popped,
            pushed = diff.pushed,
            "updated"
        );
        Some(Update::new(diff, indexed, tip))
    }

    /// Finalize the next confirmed batch, if any.
    ///
    /// Entries shifted here are dropped from the remembered tip, so the next
    /// `update()` reports them neither as popped nor as indexed.
    pub fn shift(&mut self) -> Vec<Entry> {
        let batch = self.shift_batch();
        if !batch.is_empty() {
            self.tip
                .retain(|entry| !batch.iter().any(|shifted| &shifted.entry == entry));
            self.dirty = true;
        }
        batch
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Current frontier, in entry order.
    pub fn heads(&self) -> impl Iterator<Item = &EntryRef> + '_ {
        self.heads.keys()
    }

    /// Live entries without live dependencies, in entry order.
    pub fn tails(&self) -> impl Iterator<Item = &EntryRef> + '_ {
        self.tails.keys()
    }

    /// Live entries that joined several branches when linked.
    pub fn merges(&self) -> impl Iterator<Item = &EntryRef> + '_ {
        self.merges.keys()
    }

    /// Number of live (linked, not yet final) entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Highest finalized position per writer.
    pub fn removed(&self) -> &Clock {
        &self.removed
    }

    /// Frontier of the finalized prefix.
    pub fn indexed_heads(&self) -> &[EntryRef] {
        &self.indexed_heads
    }

    /// Votes needed to confirm an entry.
    pub fn majority(&self) -> usize {
        self.majority
    }

    /// Current indexer keys, sorted.
    pub fn indexers(&self) -> &[WriterKey] {
        &self.indexers
    }

    /// Returns `true` if something changed since the last `update()`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Resolve a node id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.dag.get(id)
    }

    /// Look up a writer.
    pub fn writer(&self, key: &WriterKey) -> Option<&Writer> {
        self.dag.writer(key)
    }

    /// The underlying DAG.
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Returns `true` if a majority of indexers has confirmed the node.
    pub fn is_confirmed(&self, id: NodeId) -> bool {
        self.dag
            .get(id)
            .is_some_and(|node| node.is_linked() && self.confirmed(node, None))
    }

    fn is_indexer(&self, key: &WriterKey) -> bool {
        self.indexers.binary_search(key).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> WriterKey {
        WriterKey::new(s)
    }

    fn refs<'a>(iter: impl Iterator<Item = &'a EntryRef>) -> Vec<String> {
        iter.map(ToString::to_string).collect()
    }

    #[test]
    fn test_majority_follows_indexer_count() {
        assert_eq!(Linearizer::default().majority(), 1);
        assert_eq!(Linearizer::new(["a"]).majority(), 1);
        assert_eq!(Linearizer::new(["a", "b"]).majority(), 2);
        assert_eq!(Linearizer::new(["c", "a", "b", "a"]).majority(), 2);
        assert_eq!(Linearizer::new(["a", "b", "c", "d"]).majority(), 3);
    }

    #[test]
    fn test_indexers_are_sorted() {
        let lin = Linearizer::new(["c", "a", "b"]);
        assert_eq!(lin.indexers(), &[key("a"), key("b"), key("c")]);
    }

    #[test]
    fn test_add_head_tracks_frontier() {
        let mut lin = Linearizer::default();
        lin.append("a", Some(Bytes::from_static(b"1")), vec![])
            .unwrap();
        lin.append("b", Some(Bytes::from_static(b"1")), vec![])
            .unwrap();
        assert_eq!(refs(lin.heads()), ["a:1", "b:1"]);
        assert_eq!(refs(lin.tails()), ["a:1", "b:1"]);

        lin.append(
            "c",
            None,
            vec![EntryRef::new("a", 1), EntryRef::new("b", 1)],
        )
        .unwrap();
        assert_eq!(refs(lin.heads()), ["c:1"]);
        assert_eq!(refs(lin.merges()), ["c:1"]);
        assert_eq!(lin.size(), 3);
        assert!(lin.is_dirty());
    }

    #[test]
    fn test_add_head_requires_linked_dependencies() {
        let mut lin = Linearizer::default();
        lin.add_writer("a");
        lin.add_writer("b");

        let a1 = lin.create_node(&key("a"), 1, None, vec![], 1).unwrap();
        let b1 = lin
            .create_node(&key("b"), 1, None, vec![EntryRef::new("a", 1)], 1)
            .unwrap();

        let err = lin.add_head(b1).unwrap_err();
        assert!(matches!(err, LinearizerError::DependencyNotLinked { .. }));
        assert!(err.is_retryable());

        lin.add_head(a1).unwrap();
        lin.add_head(b1).unwrap();
        assert_eq!(refs(lin.heads()), ["b:1"]);
    }

    #[test]
    fn test_create_node_rejects_unknown_writer() {
        let mut lin = Linearizer::default();
        let err = lin.create_node(&key("x"), 1, None, vec![], 1).unwrap_err();
        assert_eq!(err.error_code(), "unknown_writer");
    }

    #[test]
    fn test_update_without_changes_is_none() {
        let mut lin = Linearizer::default();
        assert!(lin.update().is_none());

        lin.append("a", Some(Bytes::from_static(b"x")), vec![])
            .unwrap();
        assert!(lin.update().is_some());
        assert!(lin.update().is_none());

        // re-running with an unchanged DAG reports nothing
        lin.set_indexers(Vec::<WriterKey>::new());
        assert!(lin.update().is_none());
    }

    #[test]
    fn test_writer_resumes_from_offset() {
        let mut lin = Linearizer::new(["a"]);
        lin.add_writer_at("a", 3);
        assert_eq!(lin.removed().get(&key("a")), 3);

        let id = lin
            .append("a", Some(Bytes::from_static(b"x")), vec![])
            .unwrap();
        let node = lin.node(id).unwrap();
        assert_eq!(node.length(), 4);
        assert!(node.is_tail());
        assert!(lin.writer(&key("a")).unwrap().is_active_indexer());
    }

    #[test]
    fn test_remove_writer_restores_frontier() {
        let mut lin = Linearizer::default();
        lin.append("a", Some(Bytes::from_static(b"x")), vec![])
            .unwrap();
        lin.append("b", None, vec![EntryRef::new("a", 1)]).unwrap();
        assert_eq!(refs(lin.heads()), ["b:1"]);

        assert_eq!(lin.remove_writer(&key("b")).unwrap(), 1);
        assert_eq!(refs(lin.heads()), ["a:1"]);
        assert_eq!(lin.size(), 1);

        let err = lin.remove_writer(&key("b")).unwrap_err();
        assert_eq!(err, LinearizerError::UnknownWriter(key("b")));
    }

    #[test]
    fn test_removed_writer_rejoins_from_scratch() {
        let mut lin = Linearizer::new(["a"]);
        lin.append("a", Some(Bytes::from_static(b"x")), vec![])
            .unwrap();
        lin.append("a", Some(Bytes::from_static(b"y")), vec![])
            .unwrap();
        lin.update().unwrap();
        assert_eq!(lin.removed().get(&key("a")), 2);

        lin.remove_writer(&key("a")).unwrap();
        assert!(!lin.removed().contains_key(&key("a")));

        lin.add_writer("a");
        lin.set_indexers(["a"]);
        let id = lin
            .append("a", Some(Bytes::from_static(b"z")), vec![])
            .unwrap();
        assert_eq!(lin.node(id).unwrap().length(), 1);

        let update = lin.update().unwrap();
        assert_eq!(update.indexed.len(), 1);
        assert_eq!(update.indexed[0].entry, EntryRef::new("a", 1));
    }

    #[test]
    fn test_failed_append_can_be_retried() {
        let mut lin = Linearizer::new(["a"]);
        lin.add_writer("a");
        let a1 = lin.create_node(&key("a"), 1, None, vec![], 1).unwrap();

        let err = lin
            .append("b", Some(Bytes::from_static(b"x")), vec![EntryRef::new("a", 1)])
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(lin.writer(&key("b")).unwrap().length(), 0);
        assert!(lin.node(a1).unwrap().dependents().is_empty());

        lin.add_head(a1).unwrap();
        let b1 = lin
            .append("b", Some(Bytes::from_static(b"x")), vec![EntryRef::new("a", 1)])
            .unwrap();
        assert_eq!(lin.node(b1).unwrap().length(), 1);
        assert_eq!(refs(lin.heads()), ["b:1"]);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let mut lin = Linearizer::new(["a"]);
        lin.add_writer("a");
        let a1 = lin.create_node(&key("a"), 1, None, vec![], 1).unwrap();

        let values = vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")];
        let err = lin
            .append_batch("b", values.clone(), vec![EntryRef::new("a", 1)])
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(lin.writer(&key("b")).unwrap().length(), 0);

        lin.add_head(a1).unwrap();
        let ids = lin
            .append_batch("b", values, vec![EntryRef::new("a", 1)])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(lin.size(), 3);
    }
}
