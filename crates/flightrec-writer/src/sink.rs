//! Byte-sink abstraction and the growable in-memory buffer behind every
//! writer.
//!
//! A sink is append-oriented but supports random-access overwrite within the
//! already-written prefix (`patch`), which is how reserved header slots are
//! backfilled after variable-length data has been written past them. `seek`
//! rewinds the append cursor for rollback; bytes beyond the cursor become
//! unreachable (every consumer slices by cursor position, never by raw
//! storage length).

/// Sink primitives consumed by the writer stack.
///
/// `put`/`reserve` report failure by returning `false`/`None` rather than an
/// error: the owning writer marks itself invalid and degrades to no-ops, per
/// the recorder's silent-bounded-loss policy.
pub trait ByteSink {
    /// Current append cursor.
    fn position(&self) -> usize;

    /// Move the append cursor backwards (or forwards within the written
    /// prefix). Used for rollback and context restore.
    fn seek(&mut self, offset: usize);

    /// Write bytes at the cursor, growing storage on demand. Returns `false`
    /// if the sink cannot grow to fit.
    fn put(&mut self, bytes: &[u8]) -> bool;

    /// Advance the cursor by `len` zero bytes without meaningful content,
    /// returning the pre-reservation offset for later backfill. `None` if the
    /// sink cannot grow.
    fn reserve(&mut self, len: usize) -> Option<usize>;

    /// Overwrite bytes strictly within the written prefix; the cursor is
    /// unchanged. Returns `false` if the range is out of bounds.
    fn patch(&mut self, offset: usize, bytes: &[u8]) -> bool;

    /// All bytes written so far (up to the high-water mark; slice by
    /// [`position`](Self::position) for live data).
    fn written(&self) -> &[u8];

    /// Bytes still available before the growth limit.
    fn available(&self) -> usize;

    /// Mark everything up to the cursor as committed (visible to the
    /// downstream flush path).
    fn commit(&mut self);

    /// Commit point.
    fn committed(&self) -> usize;
}

/// Default per-buffer growth limit.
pub const DEFAULT_BUFFER_CAPACITY_BYTES: usize = 512 * 1024;

/// Growable in-memory byte sink with a hard capacity limit.
///
/// `data` tracks the high-water mark of bytes ever written; `pos` is the
/// append cursor and may sit below the high-water mark after a rollback, in
/// which case subsequent writes overwrite the stale suffix.
#[derive(Debug)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    pos: usize,
    committed: usize,
    max_capacity: usize,
}

impl GrowableBuffer {
    /// Create a buffer that may grow up to `max_capacity` bytes.
    #[must_use]
    pub fn new(max_capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            committed: 0,
            max_capacity,
        }
    }

    /// The configured growth limit.
    #[must_use]
    pub const fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Take all committed bytes out of the buffer, shifting any uncommitted
    /// tail down. This is the hand-off point to the downstream chunk writer.
    pub fn take_committed(&mut self) -> Vec<u8> {
        debug_assert!(self.pos >= self.committed || self.committed == 0);
        let taken: Vec<u8> = self.data.drain(..self.committed).collect();
        self.pos = self.pos.saturating_sub(taken.len());
        self.committed = 0;
        taken
    }

    fn grow_to(&mut self, end: usize) -> bool {
        if end > self.max_capacity {
            return false;
        }
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        true
    }
}

impl Default for GrowableBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY_BYTES)
    }
}

impl ByteSink for GrowableBuffer {
    fn position(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, offset: usize) {
        debug_assert!(offset <= self.data.len());
        self.pos = offset.min(self.data.len());
    }

    fn put(&mut self, bytes: &[u8]) -> bool {
        let end = self.pos + bytes.len();
        if !self.grow_to(end) {
            return false;
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        true
    }

    fn reserve(&mut self, len: usize) -> Option<usize> {
        let start = self.pos;
        let end = start + len;
        if !self.grow_to(end) {
            return None;
        }
        // Reserved slots are zeroed so an un-backfilled slot decodes as 0.
        self.data[start..end].fill(0);
        self.pos = end;
        Some(start)
    }

    fn patch(&mut self, offset: usize, bytes: &[u8]) -> bool {
        let end = offset + bytes.len();
        if end > self.data.len() {
            return false;
        }
        self.data[offset..end].copy_from_slice(bytes);
        true
    }

    fn written(&self) -> &[u8] {
        &self.data
    }

    fn available(&self) -> usize {
        self.max_capacity.saturating_sub(self.pos)
    }

    fn commit(&mut self) {
        self.committed = self.pos;
    }

    fn committed(&self) -> usize {
        self.committed
    }
}
