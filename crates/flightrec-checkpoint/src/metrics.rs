//! Checkpoint-layer telemetry.
//!
//! Counters are lock-free `AtomicU64` with `Relaxed` ordering, same contract
//! as the writer layer: stale reads possible, torn values never.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for checkpoint records and constant-pool serialization.
#[derive(Debug)]
pub struct CheckpointMetrics {
    /// Checkpoint records finalized with a backfilled header.
    pub records_finalized: AtomicU64,
    /// Checkpoint records rolled back (zero entries or invalid writer).
    pub records_rolled_back: AtomicU64,
    /// Pool tables begun (type id written).
    pub tables_written: AtomicU64,
    /// Pool tables undone because the serializer produced no rows.
    pub empty_tables_rolled_back: AtomicU64,
    /// Serializer outputs snapshotted into cache blobs.
    pub blobs_cached: AtomicU64,
    /// Cached blobs replayed instead of re-invoking a serializer.
    pub blob_replays: AtomicU64,
}

impl CheckpointMetrics {
    /// Create a metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records_finalized: AtomicU64::new(0),
            records_rolled_back: AtomicU64::new(0),
            tables_written: AtomicU64::new(0),
            empty_tables_rolled_back: AtomicU64::new(0),
            blobs_cached: AtomicU64::new(0),
            blob_replays: AtomicU64::new(0),
        }
    }

    pub fn record_finalized(&self) {
        self.records_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.records_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_table_written(&self) {
        self.tables_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_table(&self) {
        self.empty_tables_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blob_cached(&self) {
        self.blobs_cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blob_replay(&self) {
        self.blob_replays.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CheckpointMetricsSnapshot {
        CheckpointMetricsSnapshot {
            records_finalized: self.records_finalized.load(Ordering::Relaxed),
            records_rolled_back: self.records_rolled_back.load(Ordering::Relaxed),
            tables_written: self.tables_written.load(Ordering::Relaxed),
            empty_tables_rolled_back: self.empty_tables_rolled_back.load(Ordering::Relaxed),
            blobs_cached: self.blobs_cached.load(Ordering::Relaxed),
            blob_replays: self.blob_replays.load(Ordering::Relaxed),
        }
    }
}

impl Default for CheckpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of checkpoint metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointMetricsSnapshot {
    pub records_finalized: u64,
    pub records_rolled_back: u64,
    pub tables_written: u64,
    pub empty_tables_rolled_back: u64,
    pub blobs_cached: u64,
    pub blob_replays: u64,
}

impl fmt::Display for CheckpointMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checkpoint(finalized={} rolled_back={} tables={} empty={} cached={} replays={})",
            self.records_finalized,
            self.records_rolled_back,
            self.tables_written,
            self.empty_tables_rolled_back,
            self.blobs_cached,
            self.blob_replays,
        )
    }
}
