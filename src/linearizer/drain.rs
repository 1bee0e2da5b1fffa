//! Yielding confirmed entries out of the live DAG.

use autoline_dag::{EntryRef, NodeId};
use tracing::{debug, warn};

use super::Linearizer;
use super::tip::Entry;
use crate::telemetry::spans;

impl Linearizer {
    /// Finalize one confirmed batch, or nothing.
    ///
    /// Confirmed tails win over confirmed merges. A confirmed merge is
    /// descended until a tail is reached, and that tail's batch is yielded.
    pub(super) fn shift_batch(&mut self) -> Vec<Entry> {
        let _span = spans::shift().entered();

        let tail = self.confirmed_tail().or_else(|| self.confirmed_merge_tail());
        let Some(tail) = tail else {
            return Vec::new();
        };
        let Some(batch) = self.batch_from(tail) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(batch.len());
        for id in batch {
            match self.remove(id) {
                Some(entry) => out.push(entry),
                None => warn!(?id, "batch member vanished while yielding"),
            }
        }
        out
    }

    fn confirmed_tail(&self) -> Option<NodeId> {
        self.tails.values().copied().find(|&id| {
            self.dag
                .get(id)
                .is_some_and(|node| self.confirmed(node, None) && self.batch_from(id).is_some())
        })
    }

    fn confirmed_merge_tail(&self) -> Option<NodeId> {
        for &id in self.merges.values() {
            let Some(node) = self.dag.get(id) else {
                continue;
            };
            if !self.confirmed(node, None) {
                continue;
            }

            let tail = self.descend(id);
            if self.batch_from(tail).is_some() {
                return Some(tail);
            }
        }
        None
    }

    /// Walk down from a confirmed join to the tail that goes first.
    ///
    /// At every step the candidates are the live tails and merges the
    /// current node has seen, judged from that node's point of view.
    fn descend(&self, from: NodeId) -> NodeId {
        let mut id = from;

        loop {
            let Some(node) = self.dag.get(id) else {
                return id;
            };
            if node.is_tail() {
                return id;
            }

            // a fork that is already settled as seen from this join
            let settled = self
                .tails
                .values()
                .chain(self.merges.values())
                .copied()
                .filter(|&c| c != id)
                .find(|&c| {
                    self.dag
                        .get(c)
                        .is_some_and(|fork| node.sees(fork) && self.confirmed(fork, Some(node)))
                });
            if let Some(next) = settled {
                id = next;
                continue;
            }

            // nothing settled: the smallest tail this join has seen
            let fallback = self
                .tails
                .values()
                .copied()
                .find(|&t| self.dag.get(t).is_some_and(|tail| node.sees(tail)));
            return fallback.unwrap_or(id);
        }
    }

    /// The full batch starting at `start`, or `None` while the batch is
    /// still incomplete.
    ///
    /// # Panics
    ///
    /// Panics if a batch entry has more than one dependent: batches must be
    /// strict chains.
    pub(super) fn batch_from(&self, start: NodeId) -> Option<Vec<NodeId>> {
        let mut batch = vec![start];
        let mut node = self.dag.get(start)?;

        while node.continues_batch() {
            let next = match node.dependents() {
                [] => return None,
                [next] => *next,
                _ => panic!(
                    "batch is linked partially: {} has {} dependents",
                    node.entry_ref(),
                    node.dependents().len()
                ),
            };
            node = self.dag.get(next)?;
            if !node.is_linked() {
                return None;
            }
            batch.push(next);
        }

        Some(batch)
    }

    /// Drop a finalized node from every live structure.
    fn remove(&mut self, id: NodeId) -> Option<Entry> {
        let released = match self.dag.release(id) {
            Ok(released) => released,
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "failed to release node");
                return None;
            }
        };
        let node = &released.node;
        let entry = node.entry_ref();

        self.removed.observe(node.writer(), node.length());
        self.heads.remove(&entry);
        self.tails.remove(&entry);
        self.merges.remove(&entry);
        self.size -= 1;

        for &orphan in &released.orphaned {
            if let Some(dependent) = self.dag.get(orphan) {
                self.tails.insert(dependent.entry_ref(), orphan);
            }
        }

        self.indexed_heads
            .retain(|head: &EntryRef| !node.clock().includes_ref(head));
        self.indexed_heads.push(entry.clone());

        debug!(entry = %entry, batch = node.batch(), "yielded");
        Some(Entry::from_node(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoline_dag::WriterKey;
    use bytes::Bytes;

    fn payload() -> Option<Bytes> {
        Some(Bytes::from_static(b"v"))
    }

    #[test]
    fn test_single_indexer_shifts_in_log_order() {
        let mut lin = Linearizer::new(["a"]);
        lin.append("a", payload(), vec![]).unwrap();
        lin.append("a", payload(), vec![]).unwrap();

        let first = lin.shift();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].entry, EntryRef::new("a", 1));
        assert_eq!(lin.shift()[0].entry, EntryRef::new("a", 2));
        assert!(lin.shift().is_empty());

        assert_eq!(lin.size(), 0);
        assert_eq!(lin.removed().get(&WriterKey::new("a")), 2);
        assert_eq!(lin.indexed_heads(), &[EntryRef::new("a", 2)]);
    }

    #[test]
    fn test_incomplete_batch_is_not_yielded() {
        let mut lin = Linearizer::new(["a"]);
        lin.add_writer("a");
        let a = WriterKey::new("a");
        let first = lin.create_node(&a, 1, payload(), vec![], 2).unwrap();
        lin.add_head(first).unwrap();

        assert!(lin.is_confirmed(first));
        assert!(lin.shift().is_empty());

        let second = lin.create_node(&a, 2, payload(), vec![], 1).unwrap();
        assert!(lin.shift().is_empty());

        lin.add_head(second).unwrap();
        let batch = lin.shift();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].batch, 2);
        assert_eq!(batch[1].batch, 1);
    }

    #[test]
    fn test_yield_promotes_dependents_to_tails() {
        let mut lin = Linearizer::new(["a"]);
        lin.append("a", payload(), vec![]).unwrap();
        lin.append("x", payload(), vec![EntryRef::new("a", 1)])
            .unwrap();

        let tails: Vec<&EntryRef> = lin.tails().collect();
        assert_eq!(tails, [&EntryRef::new("a", 1)]);

        assert_eq!(lin.shift().len(), 1);
        let tails: Vec<&EntryRef> = lin.tails().collect();
        assert_eq!(tails, [&EntryRef::new("x", 1)]);
    }

    #[test]
    #[should_panic(expected = "batch is linked partially")]
    fn test_forked_batch_panics() {
        let mut lin = Linearizer::new(["a"]);
        lin.add_writer("a");
        lin.add_writer("x");
        let a = WriterKey::new("a");
        let first = lin.create_node(&a, 1, payload(), vec![], 2).unwrap();
        lin.add_head(first).unwrap();

        // someone builds on the middle of the batch
        let x1 = lin
            .create_node(&WriterKey::new("x"), 1, payload(), vec![EntryRef::new("a", 1)], 1)
            .unwrap();
        lin.add_head(x1).unwrap();
        let second = lin.create_node(&a, 2, payload(), vec![], 1).unwrap();
        lin.add_head(second).unwrap();

        lin.shift();
    }
}
