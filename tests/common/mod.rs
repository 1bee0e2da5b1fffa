//! Integration test common infrastructure.
//!
//! Provides a small multi-writer simulator that records entries the way
//! replicas would produce them, plus helpers to replay a recording into a
//! fresh [`Linearizer`] in any topological order.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use autoline::{Entry, EntryRef, Linearizer, WriterKey};
use bytes::Bytes;

/// Install a test subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn payload(tag: &str) -> Option<Bytes> {
    Some(Bytes::copy_from_slice(tag.as_bytes()))
}

/// Render entries as `<writer><seq>` with zero-based sequence numbers,
/// newest first.
pub fn newest_first<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<String> {
    let mut names: Vec<String> = entries
        .into_iter()
        .map(|e| format!("{}{}", e.entry.writer, e.entry.length - 1))
        .collect();
    names.reverse();
    names
}

/// Render entries as `<writer>:<length>`, in order.
pub fn refs<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<String> {
    entries
        .into_iter()
        .map(|e| e.entry.to_string())
        .collect()
}

pub fn heads(lin: &Linearizer) -> Vec<EntryRef> {
    lin.heads().cloned().collect()
}

// ============================================================================
// Simulator
// ============================================================================

/// One entry as its writer produced it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub writer: WriterKey,
    pub length: u64,
    pub value: Option<Bytes>,
    pub heads: Vec<EntryRef>,
    pub batch: u32,
}

impl Recorded {
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef::new(self.writer.clone(), self.length)
    }
}

/// Writers with partial views of each other.
///
/// Each writer appends on top of everything it currently knows about and
/// learns about other writers only through [`Sim::sync`].
pub struct Sim {
    writers: Vec<WriterKey>,
    views: Vec<BTreeMap<usize, u64>>,
    pub records: Vec<Recorded>,
}

impl Sim {
    pub fn new(writers: usize) -> Self {
        Self {
            writers: (0..writers)
                .map(|i| WriterKey::new(format!("w{i}")))
                .collect(),
            views: vec![BTreeMap::new(); writers],
            records: Vec::new(),
        }
    }

    pub fn writers(&self) -> &[WriterKey] {
        &self.writers
    }

    fn view_heads(&self, w: usize) -> Vec<EntryRef> {
        self.views[w]
            .iter()
            .filter(|&(_, &length)| length > 0)
            .map(|(&k, &length)| EntryRef::new(self.writers[k].clone(), length))
            .collect()
    }

    fn own_length(&self, w: usize) -> u64 {
        self.views[w].get(&w).copied().unwrap_or(0)
    }

    /// Append one entry for writer `w`.
    pub fn append(&mut self, w: usize, value: Option<Bytes>) {
        self.append_batch(w, vec![value]);
    }

    /// Append a batch for writer `w`. Only the first entry names heads.
    pub fn append_batch(&mut self, w: usize, values: Vec<Option<Bytes>>) {
        let total = values.len() as u32;
        let mut heads = self.view_heads(w);

        for (i, value) in values.into_iter().enumerate() {
            let length = self.own_length(w) + 1;
            self.records.push(Recorded {
                writer: self.writers[w].clone(),
                length,
                value,
                heads: std::mem::take(&mut heads),
                batch: total - i as u32,
            });
            self.views[w].insert(w, length);
        }
    }

    /// Writer `to` learns everything writer `from` knows.
    pub fn sync(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let known = self.views[from].clone();
        for (k, length) in known {
            let seen = self.views[to].entry(k).or_insert(0);
            *seen = (*seen).max(length);
        }
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Topological order of `records`, choosing among ready entries with
/// `picks` (cycled; index 0 when exhausted).
pub fn topo_order(records: &[Recorded], picks: &[u16]) -> Vec<usize> {
    let index: HashMap<EntryRef, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.entry_ref(), i))
        .collect();

    let mut pending = vec![0usize; records.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (i, r) in records.iter().enumerate() {
        let mut deps: BTreeSet<usize> = r
            .heads
            .iter()
            .filter_map(|h| index.get(h).copied())
            .collect();
        if r.length > 1
            && let Some(&prev) = index.get(&EntryRef::new(r.writer.clone(), r.length - 1))
        {
            deps.insert(prev);
        }
        pending[i] = deps.len();
        for d in deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..records.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(records.len());
    let mut step = 0;
    while !ready.is_empty() {
        let pick = picks.get(step).copied().unwrap_or(0) as usize % ready.len();
        step += 1;
        let Some(&next) = ready.iter().nth(pick) else {
            break;
        };
        ready.remove(&next);
        order.push(next);
        for &d in &dependents[next] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }
    order
}

/// What a replica ended up with.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Every entry ever reported as indexed, in order.
    pub finalized: Vec<Entry>,
    /// The last reported speculative tip.
    pub tip: Vec<EntryRef>,
}

impl Outcome {
    pub fn finalized_refs(&self) -> Vec<EntryRef> {
        self.finalized.iter().map(|e| e.entry.clone()).collect()
    }
}

/// Ingest `records` in `order` into a fresh linearizer.
///
/// With `step`, `update()` runs after every ingestion; otherwise once at
/// the end.
pub fn replay(
    indexers: &[WriterKey],
    writers: &[WriterKey],
    records: &[Recorded],
    order: &[usize],
    step: bool,
) -> Outcome {
    let mut lin = Linearizer::new(indexers.iter().cloned());
    for w in writers {
        lin.add_writer(w.clone());
    }

    let mut out = Outcome::default();

    for &i in order {
        let r = &records[i];
        let id = lin
            .create_node(&r.writer, r.length, r.value.clone(), r.heads.clone(), r.batch)
            .unwrap();
        lin.add_head(id).unwrap();
        if step {
            collect(&mut lin, &mut out);
        }
    }
    collect(&mut lin, &mut out);
    out
}

fn collect(lin: &mut Linearizer, out: &mut Outcome) {
    if let Some(update) = lin.update() {
        out.finalized.extend(update.indexed);
        out.tip = update.tip.into_iter().map(|e| e.entry).collect();
    }
}
