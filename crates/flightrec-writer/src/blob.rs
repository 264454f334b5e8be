//! Immutable, reference-counted, chainable byte-range snapshots.
//!
//! A [`Blob`] captures bytes a checkpoint writer produced so they can be
//! replayed verbatim on later rotations instead of re-serializing. Blobs form
//! a singly linked, strictly forward chain (no cycles by construction), so
//! plain `Arc` reference counting suffices. Chains support two emission
//! modes: `write` re-emits unconditionally on every call, `exclusive_write`
//! emits each node at most once until its flag is reset — used to dedupe
//! suffixes shared between multiple chains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::WriterHost;
use crate::sink::ByteSink;

/// Immutable byte range with an optional link to the next blob.
#[derive(Debug)]
pub struct Blob {
    data: Box<[u8]>,
    next: Mutex<Option<Arc<Blob>>>,
    written: AtomicBool,
}

impl Blob {
    /// Snapshot `data` into a shared blob.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: data.into_boxed_slice(),
            next: Mutex::new(None),
            written: AtomicBool::new(false),
        })
    }

    /// The captured bytes of this node only.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte length of this node only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The next blob in the chain, if any.
    #[must_use]
    pub fn next(&self) -> Option<Arc<Blob>> {
        self.next.lock().clone()
    }

    /// Relink this node's successor. Links are strictly forward; callers must
    /// not introduce a node already upstream of `self`.
    pub fn set_next(&self, next: Option<Arc<Blob>>) {
        *self.next.lock() = next;
    }

    /// The tail of the chain starting at `self`.
    #[must_use]
    pub fn last(self: &Arc<Self>) -> Arc<Blob> {
        let mut current = Arc::clone(self);
        while let Some(next) = current.next() {
            current = next;
        }
        current
    }

    /// Total byte length of the chain starting at `self`.
    #[must_use]
    pub fn chain_len(self: &Arc<Self>) -> usize {
        let mut total = 0;
        let mut current = Some(Arc::clone(self));
        while let Some(node) = current {
            total += node.len();
            current = node.next();
        }
        total
    }

    /// Unconditionally re-emit the whole chain into `writer`.
    pub fn write<S: ByteSink>(self: &Arc<Self>, writer: &mut WriterHost<S>) {
        let mut current = Some(Arc::clone(self));
        while let Some(node) = current {
            writer.write_bytes(&node.data);
            current = node.next();
        }
    }

    /// Emit each chain node at most once: nodes already emitted since the
    /// last [`reset_write_flags`](Self::reset_write_flags) are skipped.
    pub fn exclusive_write<S: ByteSink>(self: &Arc<Self>, writer: &mut WriterHost<S>) {
        let mut current = Some(Arc::clone(self));
        while let Some(node) = current {
            if !node.written.swap(true, Ordering::AcqRel) {
                writer.write_bytes(&node.data);
            }
            current = node.next();
        }
    }

    /// Clear the exclusive-write flags along the whole chain.
    pub fn reset_write_flags(self: &Arc<Self>) {
        let mut current = Some(Arc::clone(self));
        while let Some(node) = current {
            node.written.store(false, Ordering::Release);
            current = node.next();
        }
    }
}
