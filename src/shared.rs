//! Thread-safe handle around a [`Linearizer`].
//!
//! The linearizer itself is not reentrant. Callers feeding one instance from
//! several threads share it through this handle, which serializes every
//! operation behind a single lock.

use std::sync::Arc;

use autoline_dag::{EntryRef, NodeId, WriterKey};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;
use crate::linearizer::{Entry, Linearizer, Update};

/// Cloneable, lock-protected [`Linearizer`].
#[derive(Debug, Clone)]
pub struct SharedLinearizer {
    inner: Arc<Mutex<Linearizer>>,
}

impl SharedLinearizer {
    /// Wrap a linearizer.
    pub fn new(linearizer: Linearizer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(linearizer)),
        }
    }

    /// Lock for a sequence of operations that must not interleave.
    pub fn lock(&self) -> MutexGuard<'_, Linearizer> {
        self.inner.lock()
    }

    /// See [`Linearizer::append`].
    pub fn append(
        &self,
        writer: impl Into<WriterKey>,
        value: Option<Bytes>,
        heads: Vec<EntryRef>,
    ) -> Result<NodeId> {
        self.inner.lock().append(writer, value, heads)
    }

    /// See [`Linearizer::add_head`].
    pub fn add_head(&self, id: NodeId) -> Result<NodeId> {
        self.inner.lock().add_head(id)
    }

    /// See [`Linearizer::update`].
    pub fn update(&self) -> Option<Update> {
        self.inner.lock().update()
    }

    /// See [`Linearizer::shift`].
    pub fn shift(&self) -> Vec<Entry> {
        self.inner.lock().shift()
    }

    /// See [`Linearizer::should_ack`].
    pub fn should_ack(&self, writer: &WriterKey) -> bool {
        self.inner.lock().should_ack(writer)
    }

    /// Current frontier, in entry order.
    pub fn heads(&self) -> Vec<EntryRef> {
        self.inner.lock().heads().cloned().collect()
    }
}

impl From<Linearizer> for SharedLinearizer {
    fn from(linearizer: Linearizer) -> Self {
        Self::new(linearizer)
    }
}
