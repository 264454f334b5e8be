//! Buffer leasing.
//!
//! Every writer leases exactly one backing buffer for its whole lifetime and
//! releases it exactly once (on drop). Two writers never interleave onto the
//! same buffer: a leased buffer is physically out of the pool until its lease
//! drops, so mutual exclusion per buffer holds by construction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flightrec_error::{RecorderError, Result};
use parking_lot::Mutex;

use crate::metrics::WriterMetrics;
use crate::sink::{ByteSink, GrowableBuffer, DEFAULT_BUFFER_CAPACITY_BYTES};

/// Pool sizing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Growth limit of each pooled buffer.
    pub buffer_capacity_bytes: usize,
    /// Buffers allocated up front.
    pub initial_buffers: usize,
    /// Cap on concurrently outstanding leases enforced by
    /// [`BufferPool::try_lease`]; `None` is unbounded.
    pub max_outstanding_leases: Option<usize>,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffer_capacity_bytes: DEFAULT_BUFFER_CAPACITY_BYTES,
            initial_buffers: 2,
            max_outstanding_leases: None,
        }
    }
}

#[derive(Debug)]
struct PoolInner {
    config: BufferPoolConfig,
    parked: Mutex<Vec<GrowableBuffer>>,
    outstanding: AtomicUsize,
    metrics: WriterMetrics,
}

/// Shared pool of writer buffers.
///
/// Cloning is cheap; all clones lease from the same set of buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with the given sizing.
    #[must_use]
    pub fn new(config: BufferPoolConfig) -> Self {
        let parked = (0..config.initial_buffers)
            .map(|_| GrowableBuffer::new(config.buffer_capacity_bytes))
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                config,
                parked: Mutex::new(parked),
                outstanding: AtomicUsize::new(0),
                metrics: WriterMetrics::new(),
            }),
        }
    }

    fn lease_buffer(&self, buf: GrowableBuffer) -> BufferLease {
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.record_lease_acquired();
        tracing::trace!(
            target: "flightrec_writer::pool",
            capacity = buf.max_capacity(),
            "buffer leased"
        );
        BufferLease {
            inner: Arc::clone(&self.inner),
            buf: Some(buf),
        }
    }

    /// Lease a buffer for exclusive use.
    ///
    /// A parked buffer is reused when available; otherwise a fresh buffer is
    /// allocated so acquisition never blocks on another writer. The
    /// outstanding-lease cap is not enforced on this path.
    #[must_use]
    pub fn lease(&self) -> BufferLease {
        let buf = self
            .inner
            .parked
            .lock()
            .pop()
            .unwrap_or_else(|| GrowableBuffer::new(self.inner.config.buffer_capacity_bytes));
        self.lease_buffer(buf)
    }

    /// Lease a buffer, honoring the configured outstanding-lease cap.
    pub fn try_lease(&self) -> Result<BufferLease> {
        if let Some(limit) = self.inner.config.max_outstanding_leases {
            let outstanding = self.inner.outstanding.load(Ordering::Relaxed);
            if outstanding >= limit {
                return Err(RecorderError::LeaseUnavailable { outstanding, limit });
            }
        }
        Ok(self.lease())
    }

    /// Number of currently outstanding leases.
    #[must_use]
    pub fn outstanding_leases(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }

    /// Drain all committed bytes from parked buffers, in park order.
    ///
    /// This is the hand-off to the downstream chunk writer; bytes committed
    /// by a still-active lease are picked up once that lease is returned.
    #[must_use]
    pub fn drain_committed(&self) -> Vec<u8> {
        let mut parked = self.inner.parked.lock();
        let mut out = Vec::new();
        for buf in parked.iter_mut() {
            out.extend_from_slice(&buf.take_committed());
        }
        out
    }

    /// Point-in-time writer metrics.
    #[must_use]
    pub fn metrics(&self) -> &WriterMetrics {
        &self.inner.metrics
    }

    /// Number of buffers currently parked (not leased).
    #[must_use]
    pub fn parked_buffers(&self) -> usize {
        self.inner.parked.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

/// Exclusive lease on one pool buffer.
///
/// Implements [`ByteSink`] by delegation; dropping the lease parks the buffer
/// (with its committed bytes) back into the pool exactly once.
#[derive(Debug)]
pub struct BufferLease {
    inner: Arc<PoolInner>,
    buf: Option<GrowableBuffer>,
}

impl BufferLease {
    fn buf(&self) -> &GrowableBuffer {
        self.buf.as_ref().expect("lease holds a buffer until drop")
    }

    fn buf_mut(&mut self) -> &mut GrowableBuffer {
        self.buf.as_mut().expect("lease holds a buffer until drop")
    }

    /// Metrics of the owning pool.
    #[must_use]
    pub fn pool_metrics(&self) -> &WriterMetrics {
        &self.inner.metrics
    }
}

impl ByteSink for BufferLease {
    fn position(&self) -> usize {
        self.buf().position()
    }

    fn seek(&mut self, offset: usize) {
        self.buf_mut().seek(offset);
    }

    fn put(&mut self, bytes: &[u8]) -> bool {
        let ok = self.buf_mut().put(bytes);
        if !ok {
            self.inner.metrics.record_buffer_exhaustion();
        }
        ok
    }

    fn reserve(&mut self, len: usize) -> Option<usize> {
        let reserved = self.buf_mut().reserve(len);
        if reserved.is_none() {
            self.inner.metrics.record_buffer_exhaustion();
        }
        reserved
    }

    fn patch(&mut self, offset: usize, bytes: &[u8]) -> bool {
        self.buf_mut().patch(offset, bytes)
    }

    fn written(&self) -> &[u8] {
        self.buf().written()
    }

    fn available(&self) -> usize {
        self.buf().available()
    }

    fn commit(&mut self) {
        self.buf_mut().commit();
    }

    fn committed(&self) -> usize {
        self.buf().committed()
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.inner.outstanding.fetch_sub(1, Ordering::Relaxed);
            self.inner.metrics.record_lease_released();
            tracing::trace!(
                target: "flightrec_writer::pool",
                committed = buf.committed(),
                "buffer lease returned"
            );
            self.inner.parked.lock().push(buf);
        }
    }
}
