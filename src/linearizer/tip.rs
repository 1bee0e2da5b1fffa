//! Speculative ordering of the live DAG and incremental diffs.

use std::collections::BTreeMap;

use autoline_dag::{EntryRef, Node, NodeId};
use bytes::Bytes;

use super::Linearizer;

/// Snapshot of one ordered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Which entry this is.
    pub entry: EntryRef,
    /// Payload; `None` for ack-only entries.
    pub value: Option<Bytes>,
    /// Entries remaining in its batch, itself included.
    pub batch: u32,
}

impl Entry {
    pub(super) fn from_node(node: &Node) -> Self {
        Self {
            entry: node.entry_ref(),
            value: node.value().cloned(),
            batch: node.batch(),
        }
    }
}

/// How a new ordering differs from the previous one.
///
/// A consumer holding the old list truncates it to `shared`, which drops
/// `popped` entries, then appends the last `pushed` entries of the new list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TipDiff {
    /// Length of the common prefix.
    pub shared: usize,
    /// Entries of the old list past the common prefix.
    pub popped: usize,
    /// Entries of the new list past the common prefix.
    pub pushed: usize,
}

impl TipDiff {
    /// Diff two orderings.
    pub fn between(old: &[EntryRef], new: &[EntryRef]) -> Self {
        let shared = old.iter().zip(new).take_while(|(a, b)| a == b).count();
        Self {
            shared,
            popped: old.len() - shared,
            pushed: new.len() - shared,
        }
    }

    /// Length of the new ordering.
    pub fn length(&self) -> usize {
        self.shared + self.pushed
    }

    /// Returns `true` if both orderings are identical.
    pub fn is_unchanged(&self) -> bool {
        self.popped == 0 && self.pushed == 0
    }
}

/// Result of [`Linearizer::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Common prefix with the previously reported ordering.
    pub shared: usize,
    /// Entries of the previous ordering to drop.
    pub popped: usize,
    /// Entries to append, taken from the end of `indexed ++ tip`.
    pub pushed: usize,
    /// `shared + pushed`.
    pub length: usize,
    /// Newly finalized entries, in order.
    pub indexed: Vec<Entry>,
    /// Speculative order of everything still live.
    pub tip: Vec<Entry>,
}

impl Update {
    pub(super) fn new(diff: TipDiff, indexed: Vec<Entry>, tip: Vec<Entry>) -> Self {
        Self {
            shared: diff.shared,
            popped: diff.popped,
            pushed: diff.pushed,
            length: diff.length(),
            indexed,
            tip,
        }
    }

    /// Finalized entries followed by the speculative ones.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.indexed.iter().chain(&self.tip)
    }
}

impl Linearizer {
    pub(super) fn tip_entries(&self) -> Vec<Entry> {
        self.tip_order()
            .into_iter()
            .filter_map(|id| self.dag.get(id))
            .map(Entry::from_node)
            .collect()
    }

    /// Deterministic topological order of every live node, oldest first.
    ///
    /// Built from the top: repeatedly take the frontier node with the fewest
    /// entries no other frontier node has seen, then admit its dependencies
    /// once nothing left in the frontier still covers them. Ties go to the
    /// smaller entry. Reversing the taken sequence keeps each fork contiguous
    /// with the larger forks first.
    pub(super) fn tip_order(&self) -> Vec<NodeId> {
        let mut frontier: Frontier<'_> = self
            .heads
            .iter()
            .filter_map(|(entry, &id)| self.dag.get(id).map(|node| (entry.clone(), (id, node))))
            .collect();
        let mut taken = Vec::with_capacity(self.size);

        while let Some(pick) = self.pick_next(&frontier) {
            let Some((id, node)) = frontier.remove(&pick) else {
                break;
            };
            taken.push(id);

            let mut admitted = Vec::new();
            for &dep in node.dependencies() {
                let Some(parent) = self.dag.get(dep) else {
                    continue;
                };
                if !frontier.values().any(|(_, f)| f.sees(parent)) {
                    admitted.push((parent.entry_ref(), (dep, parent)));
                }
            }
            frontier.extend(admitted);
        }

        taken.reverse();
        taken
    }

    fn pick_next(&self, frontier: &Frontier<'_>) -> Option<EntryRef> {
        let mut best: Option<(u64, &EntryRef)> = None;

        for (entry, (_, node)) in frontier {
            let size = self.exclusive_size(entry, node, frontier);
            // entries ascend, so only a strictly smaller size replaces
            if best.is_none_or(|(b, _)| size < b) {
                best = Some((size, entry));
            }
        }

        best.map(|(_, entry)| entry.clone())
    }

    /// Entries in `node`'s view that neither another frontier node nor the
    /// finalized prefix covers.
    fn exclusive_size(&self, me: &EntryRef, node: &Node, frontier: &Frontier<'_>) -> u64 {
        node.clock()
            .iter()
            .map(|(writer, length)| {
                let covered = frontier
                    .iter()
                    .filter(|(entry, _)| *entry != me)
                    .map(|(_, (_, other))| other.clock().get(writer))
                    .fold(self.removed.get(writer), u64::max);
                length.saturating_sub(covered)
            })
            .sum()
    }
}

type Frontier<'a> = BTreeMap<EntryRef, (NodeId, &'a Node)>;
