//! Writer-layer telemetry.
//!
//! Counters are lock-free `AtomicU64` with `Relaxed` ordering — callers may
//! observe stale reads but never torn values.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for buffer leasing and event framing.
#[derive(Debug)]
pub struct WriterMetrics {
    /// Total buffer leases handed out.
    pub leases_acquired: AtomicU64,
    /// Total buffer leases returned to the pool.
    pub leases_released: AtomicU64,
    /// Total framed events committed (size prefix backfilled).
    pub events_committed: AtomicU64,
    /// Total small-framed events discarded because their size exceeded the
    /// one-byte prefix slot.
    pub events_discarded_oversized: AtomicU64,
    /// Total writes refused because a buffer hit its growth limit.
    pub buffer_exhaustions: AtomicU64,
}

impl WriterMetrics {
    /// Create a metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            leases_acquired: AtomicU64::new(0),
            leases_released: AtomicU64::new(0),
            events_committed: AtomicU64::new(0),
            events_discarded_oversized: AtomicU64::new(0),
            buffer_exhaustions: AtomicU64::new(0),
        }
    }

    pub fn record_lease_acquired(&self) {
        self.leases_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease_released(&self) {
        self.leases_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_committed(&self) {
        self.events_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_discarded(&self) {
        self.events_discarded_oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_exhaustion(&self) {
        self.buffer_exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot {
            leases_acquired: self.leases_acquired.load(Ordering::Relaxed),
            leases_released: self.leases_released.load(Ordering::Relaxed),
            events_committed: self.events_committed.load(Ordering::Relaxed),
            events_discarded_oversized: self.events_discarded_oversized.load(Ordering::Relaxed),
            buffer_exhaustions: self.buffer_exhaustions.load(Ordering::Relaxed),
        }
    }
}

impl Default for WriterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of writer metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriterMetricsSnapshot {
    pub leases_acquired: u64,
    pub leases_released: u64,
    pub events_committed: u64,
    pub events_discarded_oversized: u64,
    pub buffer_exhaustions: u64,
}

impl fmt::Display for WriterMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "writer(leased={} released={} committed={} discarded={} exhausted={})",
            self.leases_acquired,
            self.leases_released,
            self.events_committed,
            self.events_discarded_oversized,
            self.buffer_exhaustions,
        )
    }
}
