//! Acknowledgement advisory.
//!
//! Tells an indexer whether appending an entry now would move some live
//! entry toward confirmation. Only liveness depends on the answer.

use std::collections::BTreeSet;

use autoline_dag::{Node, NodeId, WriterKey};
use tracing::trace;

use super::Linearizer;
use super::confirm::Confirmation;

impl Linearizer {
    /// Returns `true` if `writer` should append (possibly an ack-only entry)
    /// to help the live DAG reach quorum.
    ///
    /// Non-indexers never need to ack, and ack-only entries never ask for
    /// acks themselves, so acking stops once every payload is final.
    pub fn should_ack(&self, writer: &WriterKey) -> bool {
        if !self.acks_enabled || !self.is_indexer(writer) {
            return false;
        }
        let Some(log) = self.dag.writer(writer) else {
            return false;
        };
        if !log.is_active_indexer() {
            return false;
        }

        let mut visited = BTreeSet::new();
        let mut stack: Vec<NodeId> = self
            .merges
            .values()
            .rev()
            .chain(self.tails.values().rev())
            .copied()
            .collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.dag.get(id) else {
                continue;
            };
            if !node.is_linked() {
                continue;
            }

            if node.value().is_some() && self.missing_ack(node, writer) {
                trace!(writer = %writer, target = %node.entry_ref(), "ack wanted");
                return true;
            }

            stack.extend(node.dependents().iter().rev().copied());
        }

        false
    }

    /// Returns `true` if `target` is unconfirmed and `writer`'s contribution
    /// to its quorum is still missing.
    ///
    /// For the writer's own entries only the vote can be missing: the entry
    /// is its own witness.
    fn missing_ack(&self, target: &Node, writer: &WriterKey) -> bool {
        let Some(log) = self.dag.writer(writer) else {
            return false;
        };
        if self.confirmed(target, None) {
            return false;
        }

        let next = log
            .next_after(target.clock().get(writer))
            .and_then(|id| self.dag.get(id));
        if let Some(next) = next {
            // our next entry is concurrent: ack only if nothing of ours has
            // seen the target yet
            if !next.sees(target) {
                let head = log.head().and_then(|id| self.dag.get(id));
                return head.is_none_or(|head| !head.sees(target));
            }
            if !self.strictly_newer(target, next) {
                return false;
            }
        }

        let ack_ids = self.acks(target);
        let acks: Vec<&Node> = ack_ids.iter().filter_map(|&id| self.dag.get(id)).collect();

        // nothing written since the target's view of us
        let unseen = next.is_none();
        let witnessed = acks.iter().any(|ack| ack.writer() == writer);
        if unseen && !witnessed {
            return true;
        }

        acks.len() >= self.majority
            && self.confirms(writer, target, &acks, log.length()) != Confirmation::Acked
    }
}
