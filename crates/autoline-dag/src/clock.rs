//! Causal visibility clocks.
//!
//! A [`Clock`] maps each writer to the highest append length observed from
//! it. Every node carries one; the linearizer keeps a second one recording
//! which positions have been finalized.

use std::collections::btree_map;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::key::{EntryRef, WriterKey};

/// A vector clock over writer logs.
///
/// Each entry maps a writer to the length of its log that is causally
/// visible. Missing writers read as length 0. Entries only grow; there is no
/// per-writer delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Clock {
    seen: BTreeMap<WriterKey, u64>,
}

impl Clock {
    /// Create a new empty clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writers with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if no writer has an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Returns `true` if the writer has an explicit entry.
    #[must_use]
    pub fn contains_key(&self, writer: &WriterKey) -> bool {
        self.seen.contains_key(writer)
    }

    /// Get the observed length for a writer (0 if unknown).
    #[must_use]
    pub fn get(&self, writer: &WriterKey) -> u64 {
        self.seen.get(writer).copied().unwrap_or(0)
    }

    /// Set the observed length for a writer and return it.
    pub fn set(&mut self, writer: WriterKey, length: u64) -> u64 {
        self.seen.insert(writer, length);
        length
    }

    /// Returns `true` if the clock has seen `writer` up to at least `length`.
    #[inline]
    #[must_use]
    pub fn includes(&self, writer: &WriterKey, length: u64) -> bool {
        self.get(writer) >= length
    }

    /// Returns `true` if the clock has seen the referenced entry.
    #[inline]
    #[must_use]
    pub fn includes_ref(&self, entry: &EntryRef) -> bool {
        self.includes(&entry.writer, entry.length)
    }

    /// Raise a single entry to at least `length`.
    pub fn observe(&mut self, writer: &WriterKey, length: u64) {
        match self.seen.get_mut(writer) {
            Some(current) => *current = (*current).max(length),
            None => {
                self.seen.insert(writer.clone(), length);
            }
        }
    }

    /// Update to include everything another clock has seen (pointwise max).
    pub fn merge(&mut self, other: &Self) {
        for (writer, &length) in &other.seen {
            self.observe(writer, length);
        }
    }

    /// Forget a writer entirely, returning its length if it had an entry.
    pub fn remove(&mut self, writer: &WriterKey) -> Option<u64> {
        self.seen.remove(writer)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.seen.clear();
    }

    /// Iterate over `(writer, length)` pairs in key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.seen.iter(),
        }
    }
}

/// Iterator over the entries of a [`Clock`].
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, WriterKey, u64>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a WriterKey, u64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(writer, &length)| (writer, length))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> IntoIterator for &'a Clock {
    type Item = (&'a WriterKey, u64);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(WriterKey, u64)> for Clock {
    fn from_iter<I: IntoIterator<Item = (WriterKey, u64)>>(iter: I) -> Self {
        let mut clock = Clock::new();
        for (writer, length) in iter {
            clock.observe(&writer, length);
        }
        clock
    }
}
