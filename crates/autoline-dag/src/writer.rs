//! Per-writer append logs.

use std::collections::VecDeque;

use crate::arena::NodeId;
use crate::key::WriterKey;

/// The retained part of one writer's log.
///
/// Positions below [`indexed_offset`](Writer::indexed_offset) have been
/// finalized and dropped; `get` returns `None` for them.
#[derive(Debug, Clone)]
pub struct Writer {
    key: WriterKey,
    indexer: bool,
    offset: u64,
    nodes: VecDeque<NodeId>,
}

impl Writer {
    pub(crate) fn new(key: WriterKey, offset: u64) -> Self {
        Self {
            key,
            indexer: false,
            offset,
            nodes: VecDeque::new(),
        }
    }

    /// The writer's key.
    #[must_use]
    pub fn key(&self) -> &WriterKey {
        &self.key
    }

    /// Returns `true` if this writer's acknowledgements count toward quorum.
    #[must_use]
    pub fn is_active_indexer(&self) -> bool {
        self.indexer
    }

    pub(crate) fn set_indexer(&mut self, indexer: bool) {
        self.indexer = indexer;
    }

    /// Number of entries ever appended (finalized ones included).
    #[must_use]
    pub fn length(&self) -> u64 {
        self.offset + self.nodes.len() as u64
    }

    /// Compaction boundary: positions below this are no longer retained.
    #[must_use]
    pub fn indexed_offset(&self) -> u64 {
        self.offset
    }

    /// Node at 0-based sequence number `seq`, if retained.
    #[must_use]
    pub fn get(&self, seq: u64) -> Option<NodeId> {
        let rel = seq.checked_sub(self.offset)?;
        self.nodes.get(usize::try_from(rel).ok()?).copied()
    }

    /// First retained node at or after `seq`.
    ///
    /// This is the writer's next entry beyond a view that has seen `seq`
    /// entries, skipping anything already finalized.
    #[must_use]
    pub fn next_after(&self, seq: u64) -> Option<NodeId> {
        self.get(seq.max(self.offset))
    }

    /// Most recent node, if any is retained.
    #[must_use]
    pub fn head(&self) -> Option<NodeId> {
        self.nodes.back().copied()
    }

    /// Retained node ids, oldest first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub(crate) fn push(&mut self, id: NodeId) {
        self.nodes.push_back(id);
    }

    /// Drop the oldest retained entry once it has been finalized.
    pub(crate) fn compact_front(&mut self, id: NodeId) -> bool {
        if self.nodes.front() != Some(&id) {
            return false;
        }
        self.nodes.pop_front();
        self.offset += 1;
        true
    }

    /// Drop the newest entry again if it is `id`.
    pub(crate) fn pop_back(&mut self, id: NodeId) -> bool {
        if self.nodes.back() != Some(&id) {
            return false;
        }
        self.nodes.pop_back();
        true
    }

    pub(crate) fn drain(&mut self) -> Vec<NodeId> {
        self.nodes.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut arena = Arena::default();
        (0..n).map(|i| arena.insert(i)).collect()
    }

    #[test]
    fn get_respects_offset() {
        let ids = ids(3);
        let mut writer = Writer::new(WriterKey::new("a"), 2);
        for id in &ids {
            writer.push(*id);
        }

        assert_eq!(writer.length(), 5);
        assert_eq!(writer.get(1), None);
        assert_eq!(writer.get(2), Some(ids[0]));
        assert_eq!(writer.get(4), Some(ids[2]));
        assert_eq!(writer.get(5), None);
    }

    #[test]
    fn next_after_skips_finalized_positions() {
        let ids = ids(2);
        let mut writer = Writer::new(WriterKey::new("a"), 0);
        writer.push(ids[0]);
        writer.push(ids[1]);

        assert!(writer.compact_front(ids[0]));
        assert_eq!(writer.indexed_offset(), 1);
        assert_eq!(writer.next_after(0), Some(ids[1]));
        assert_eq!(writer.next_after(2), None);
        assert_eq!(writer.head(), Some(ids[1]));
    }

    #[test]
    fn compact_front_only_accepts_oldest() {
        let ids = ids(2);
        let mut writer = Writer::new(WriterKey::new("a"), 0);
        writer.push(ids[0]);
        writer.push(ids[1]);

        assert!(!writer.compact_front(ids[1]));
        assert_eq!(writer.indexed_offset(), 0);
    }

    #[test]
    fn pop_back_only_accepts_newest() {
        let ids = ids(2);
        let mut writer = Writer::new(WriterKey::new("a"), 3);
        writer.push(ids[0]);
        writer.push(ids[1]);

        assert!(!writer.pop_back(ids[0]));
        assert!(writer.pop_back(ids[1]));
        assert_eq!(writer.length(), 4);
        assert_eq!(writer.head(), Some(ids[0]));
    }
}
