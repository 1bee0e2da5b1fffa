//! Majority-quorum confirmation.
//!
//! An entry is final once a majority of indexers each has an entry in its
//! own log that (a) has seen a majority of the entry's acknowledgements and
//! (b) is unambiguously causally after it. Both checks only ever become true
//! as the DAG grows, which is what makes a confirmed prefix permanent.

use std::collections::BTreeSet;

use autoline_dag::{Node, NodeId, WriterKey};

use super::Linearizer;

/// One indexer's vote on a target entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confirmation {
    /// The indexer has no entry that is strictly newer than the target.
    Unseen,
    /// Strictly newer, but without having seen a majority of acks.
    Newer,
    /// Strictly newer and has seen a majority of acks.
    Acked,
}

impl Linearizer {
    /// How `indexer` currently votes on the node `id`.
    pub fn confirmation(&self, indexer: &WriterKey, id: NodeId) -> Confirmation {
        let (Some(target), Some(writer)) = (self.dag.get(id), self.dag.writer(indexer)) else {
            return Confirmation::Unseen;
        };
        let acks: Vec<&Node> = self
            .acks(target)
            .into_iter()
            .filter_map(|ack| self.dag.get(ack))
            .collect();
        self.confirms(indexer, target, &acks, writer.length())
    }

    /// Returns `true` if `parent` has seen `object` and nothing it has seen
    /// contradicts that ordering.
    ///
    /// A contradiction is any writer whose entry right after `object`'s view
    /// was seen by `parent` without itself having seen `object`.
    pub(super) fn strictly_newer(&self, object: &Node, parent: &Node) -> bool {
        for (key, latest) in parent.clock() {
            let oldest = self.removed.get(key);
            if latest <= oldest {
                continue;
            }

            let length = object.clock().get(key).max(oldest);
            if latest < length {
                return false;
            }
            if latest == length {
                continue;
            }

            let Some(next) = self.next_entry(key, length) else {
                continue;
            };
            if next.sees(object) || !parent.sees(next) {
                continue;
            }
            return false;
        }

        parent.sees(object)
    }

    /// Entry of `key` right after a view that has seen `length` of its log.
    fn next_entry(&self, key: &WriterKey, length: u64) -> Option<&Node> {
        let writer = self.dag.writer(key)?;
        writer.next_after(length).and_then(|id| self.dag.get(id))
    }

    /// Witnesses for `target`: the target itself when written by an indexer,
    /// plus at most one strictly newer entry per other indexer.
    pub(super) fn acks(&self, target: &Node) -> Vec<NodeId> {
        let mut acks = Vec::with_capacity(self.indexers.len());

        if self.is_indexer(target.writer()) {
            if let Some(id) = self.id_of(target) {
                acks.push(id);
            }
        }

        for idx in &self.indexers {
            if idx == target.writer() {
                continue;
            }
            let Some(writer) = self.dag.writer(idx) else {
                continue;
            };
            let Some(id) = writer.next_after(target.clock().get(idx)) else {
                continue;
            };
            let Some(next) = self.dag.get(id) else {
                continue;
            };

            if next.sees(target) && self.strictly_newer(target, next) {
                acks.push(id);
            }
        }

        acks
    }

    fn id_of(&self, node: &Node) -> Option<NodeId> {
        self.dag
            .writer(node.writer())
            .and_then(|w| w.get(node.length() - 1))
    }

    /// How `indexer`'s first `length` entries vote on `target`.
    ///
    /// Scans the log backwards for the newest entry that is strictly newer
    /// than the target and has seen a majority of `acks`.
    pub(super) fn confirms(
        &self,
        indexer: &WriterKey,
        target: &Node,
        acks: &[&Node],
        length: u64,
    ) -> Confirmation {
        if length == 0 || self.removed.get(indexer) >= length {
            return Confirmation::Unseen;
        }
        let Some(writer) = self.dag.writer(indexer) else {
            return Confirmation::Unseen;
        };
        let at = |seq: i64| {
            u64::try_from(seq)
                .ok()
                .and_then(|seq| writer.get(seq))
                .and_then(|id| self.dag.get(id))
        };

        let top = length as i64 - 1;
        let mut jump = true;
        let mut newer = true;
        let mut i = top + 1;

        while i > 0 {
            i -= 1;
            let Some(head) = at(i) else {
                return Confirmation::Unseen;
            };

            let seen = acks
                .iter()
                .filter(|ack| head.sees(ack))
                .take(self.majority)
                .count();

            if !newer && seen < self.majority {
                break;
            }

            if !self.strictly_newer(target, head) {
                // strictly newer entries form one contiguous run; bisect to it
                if jump {
                    jump = false;

                    let mut t = top;
                    let mut b = 0;
                    while t > b {
                        let mid = (t + b) / 2;
                        let past = at(mid)
                            .is_none_or(|node| !node.sees(target) || self.strictly_newer(target, node));
                        if past {
                            b = mid + 1;
                        } else {
                            t = mid - 1;
                        }
                    }

                    if b + 1 < i {
                        i = b + 2;
                    }
                }

                newer = false;
                continue;
            }

            if seen < self.majority {
                return Confirmation::Newer;
            }
            return Confirmation::Acked;
        }

        Confirmation::Unseen
    }

    /// Quorum test for `target`.
    ///
    /// Without a `parent` the indexers vote with their full logs. With one,
    /// they vote with the prefix `parent` has seen, and indexers that could
    /// still vote for the target from there also count.
    pub(super) fn confirmed(&self, target: &Node, parent: Option<&Node>) -> bool {
        let ack_ids = self.acks(target);
        if ack_ids.len() < self.majority {
            return false;
        }
        let acks: Vec<&Node> = ack_ids.iter().filter_map(|&id| self.dag.get(id)).collect();

        let mut confs = BTreeSet::new();
        for idx in &self.indexers {
            let length = match parent {
                Some(p) if p.writer() == idx => p.length() - 1,
                Some(p) => p.clock().get(idx),
                None => self.dag.writer(idx).map_or(0, |w| w.length()),
            };

            if self.confirms(idx, target, &acks, length) == Confirmation::Acked {
                confs.insert(idx);
                if confs.len() >= self.majority {
                    return true;
                }
            }
        }

        match parent {
            Some(parent) => self.confirmable_at(target, parent, &acks, &confs),
            None => false,
        }
    }

    fn confirmable_at(
        &self,
        target: &Node,
        parent: &Node,
        acks: &[&Node],
        confs: &BTreeSet<&WriterKey>,
    ) -> bool {
        if !self.acked_at(acks, parent) {
            return false;
        }

        let mut potential = confs.len();
        for idx in &self.indexers {
            if confs.contains(idx) {
                continue;
            }

            let length = parent.clock().get(idx);
            if !target.clock().includes(idx, length) {
                // the indexer's latest entry known to parent must not contradict
                let head = self
                    .dag
                    .writer(idx)
                    .and_then(|w| w.get(length - 1))
                    .and_then(|id| self.dag.get(id));
                if let Some(head) = head
                    && !self.removed.includes(head.writer(), head.length())
                    && !self.strictly_newer(target, head)
                {
                    continue;
                }
            }

            potential += 1;
            if potential >= self.majority {
                return true;
            }
        }

        false
    }

    /// Returns `true` if `parent` has seen a majority of `acks`.
    fn acked_at(&self, acks: &[&Node], parent: &Node) -> bool {
        acks.iter().filter(|ack| parent.sees(ack)).count() >= self.majority
    }
}
