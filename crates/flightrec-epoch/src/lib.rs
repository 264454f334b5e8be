//! Versioned epoch-based reclamation.
//!
//! A [`VersionSystem`] tracks a singly linked chain of version nodes, newest
//! (tip) to oldest. A reader "checks out" the current tip before walking a
//! shared structure, pinning that version; the structural mutator publishes a
//! new tip after each modification ([`VersionSystem::commit`]) and then waits
//! until no outstanding checkout references any older version
//! ([`VersionSystem::await_version`]), at which point memory retired by the
//! modification is provably unreachable and safe to free.
//!
//! Concurrency contract: arbitrarily many concurrent readers may
//! checkout/release without blocking each other; at most one mutator performs
//! `commit`/`await_version` at a time (external structural lock). The only
//! operation that can spin is `await_version`, and it is mutator-only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Atomic counters for version-system activity.
///
/// Counters are lock-free `AtomicU64` with `Relaxed` ordering — callers may
/// observe stale reads but never torn values.
#[derive(Debug)]
pub struct EpochMetrics {
    /// Total checkouts (version pins) taken.
    pub checkouts_total: AtomicU64,
    /// Total checkout handles released.
    pub releases_total: AtomicU64,
    /// Total versions published by the mutator.
    pub commits_total: AtomicU64,
    /// Total `await_version` calls.
    pub awaits_total: AtomicU64,
    /// Total yield iterations spent inside `await_version`.
    pub await_spins_total: AtomicU64,
    /// Total stale-reader warnings emitted.
    pub stale_reader_warnings_total: AtomicU64,
    /// High-water mark of concurrently active pins observed.
    pub active_pins_high_water: AtomicU64,
}

impl EpochMetrics {
    /// Create a metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            checkouts_total: AtomicU64::new(0),
            releases_total: AtomicU64::new(0),
            commits_total: AtomicU64::new(0),
            awaits_total: AtomicU64::new(0),
            await_spins_total: AtomicU64::new(0),
            stale_reader_warnings_total: AtomicU64::new(0),
            active_pins_high_water: AtomicU64::new(0),
        }
    }

    fn record_checkout(&self, current_active: u64) {
        self.checkouts_total.fetch_add(1, Ordering::Relaxed);
        // CAS loop to update the high-water mark.
        loop {
            let prev = self.active_pins_high_water.load(Ordering::Relaxed);
            if current_active <= prev {
                break;
            }
            if self
                .active_pins_high_water
                .compare_exchange_weak(prev, current_active, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    fn record_release(&self) {
        self.releases_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_commit(&self) {
        self.commits_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_await(&self) {
        self.awaits_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_await_spin(&self) {
        self.await_spins_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stale_warnings(&self, count: u64) {
        self.stale_reader_warnings_total
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Read a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EpochMetricsSnapshot {
        EpochMetricsSnapshot {
            checkouts_total: self.checkouts_total.load(Ordering::Relaxed),
            releases_total: self.releases_total.load(Ordering::Relaxed),
            commits_total: self.commits_total.load(Ordering::Relaxed),
            awaits_total: self.awaits_total.load(Ordering::Relaxed),
            await_spins_total: self.await_spins_total.load(Ordering::Relaxed),
            stale_reader_warnings_total: self.stale_reader_warnings_total.load(Ordering::Relaxed),
            active_pins_high_water: self.active_pins_high_water.load(Ordering::Relaxed),
        }
    }
}

impl Default for EpochMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of [`EpochMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpochMetricsSnapshot {
    pub checkouts_total: u64,
    pub releases_total: u64,
    pub commits_total: u64,
    pub awaits_total: u64,
    pub await_spins_total: u64,
    pub stale_reader_warnings_total: u64,
    pub active_pins_high_water: u64,
}

impl std::fmt::Display for EpochMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "epoch(checkouts={} releases={} commits={} awaits={} spins={} stale_warn={} hw={})",
            self.checkouts_total,
            self.releases_total,
            self.commits_total,
            self.awaits_total,
            self.await_spins_total,
            self.stale_reader_warnings_total,
            self.active_pins_high_water,
        )
    }
}

// ---------------------------------------------------------------------------
// Stale-reader detection
// ---------------------------------------------------------------------------

/// Configuration for stale-reader detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleReaderConfig {
    /// Pins older than this duration are considered stale.
    pub warn_after: Duration,
    /// Minimum interval between repeated warnings for the same pin.
    pub warn_every: Duration,
}

impl Default for StaleReaderConfig {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(30),
            warn_every: Duration::from_secs(5),
        }
    }
}

/// Snapshot of one active stale pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSnapshot {
    /// Stable ID assigned to the pin.
    pub pin_id: u64,
    /// Version the pin is holding.
    pub version: u64,
    /// Elapsed pin duration.
    pub pinned_for: Duration,
}

#[derive(Debug, Clone, Copy)]
struct PinState {
    version: u64,
    pinned_at: Instant,
    last_warned_at: Option<Instant>,
}

#[derive(Debug)]
struct PinRegistry {
    stale_reader: StaleReaderConfig,
    next_pin_id: AtomicU64,
    active: Mutex<HashMap<u64, PinState>>,
}

impl PinRegistry {
    fn new(stale_reader: StaleReaderConfig) -> Self {
        Self {
            stale_reader,
            next_pin_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, version: u64, pinned_at: Instant) -> u64 {
        let pin_id = self.next_pin_id.fetch_add(1, Ordering::Relaxed);
        self.active.lock().insert(
            pin_id,
            PinState {
                version,
                pinned_at,
                last_warned_at: None,
            },
        );
        pin_id
    }

    fn unregister(&self, pin_id: u64) -> Option<Duration> {
        self.active
            .lock()
            .remove(&pin_id)
            .map(|state| state.pinned_at.elapsed())
    }

    fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn stale_snapshots(&self, now: Instant) -> Vec<PinSnapshot> {
        self.active
            .lock()
            .iter()
            .filter_map(|(&pin_id, state)| {
                let pinned_for = now.saturating_duration_since(state.pinned_at);
                if pinned_for >= self.stale_reader.warn_after {
                    Some(PinSnapshot {
                        pin_id,
                        version: state.version,
                        pinned_for,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    fn warn_on_stale(&self, now: Instant) -> usize {
        let mut warned = 0_usize;
        let mut active = self.active.lock();
        for (&pin_id, state) in active.iter_mut() {
            let pinned_for = now.saturating_duration_since(state.pinned_at);
            if pinned_for < self.stale_reader.warn_after {
                continue;
            }
            let should_warn = state.last_warned_at.is_none_or(|last| {
                now.saturating_duration_since(last) >= self.stale_reader.warn_every
            });
            if should_warn {
                tracing::warn!(
                    target: "flightrec_epoch::version",
                    pin_id,
                    version = state.version,
                    pinned_for_ms = pinned_for.as_millis(),
                    stale_warn_after_ms = self.stale_reader.warn_after.as_millis(),
                    "stale version pin is blocking reclamation"
                );
                state.last_warned_at = Some(now);
                warned += 1;
            }
        }
        drop(active);
        warned
    }
}

// ---------------------------------------------------------------------------
// Version chain
// ---------------------------------------------------------------------------

/// One published version in the newest-to-oldest chain.
#[derive(Debug)]
pub struct VersionNode {
    version: u64,
    refs: AtomicU64,
    live: AtomicBool,
    next: Mutex<Option<Arc<VersionNode>>>,
}

impl VersionNode {
    fn new(version: u64, next: Option<Arc<VersionNode>>) -> Arc<Self> {
        Arc::new(Self {
            version,
            refs: AtomicU64::new(0),
            live: AtomicBool::new(true),
            next: Mutex::new(next),
        })
    }

    /// The monotonically increasing version number.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of outstanding checkouts pinning this node.
    #[must_use]
    pub fn ref_count(&self) -> u64 {
        self.refs.load(Ordering::Acquire)
    }

    /// Whether this node is still the tip (not superseded).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn next_node(&self) -> Option<Arc<VersionNode>> {
        self.next.lock().clone()
    }
}

/// Reader-side pin on one version.
///
/// Holds a reference on the checked-out node for its lifetime; dropping the
/// handle releases the pin. While the handle is live the reader observes the
/// pre-commit state of the protected structure for any version newer than the
/// pinned one — never a torn mixture.
#[derive(Debug)]
pub struct VersionHandle {
    system: Arc<VersionSystem>,
    node: Arc<VersionNode>,
    pin_id: u64,
    pinned_at: Instant,
}

impl VersionHandle {
    /// The pinned version number.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.node.version()
    }

    /// Stable ID for diagnostics and stale-reader reporting.
    #[must_use]
    pub const fn pin_id(&self) -> u64 {
        self.pin_id
    }

    /// Elapsed pin duration.
    #[must_use]
    pub fn pinned_for(&self) -> Duration {
        self.pinned_at.elapsed()
    }
}

impl Drop for VersionHandle {
    fn drop(&mut self) {
        self.node.refs.fetch_sub(1, Ordering::AcqRel);
        self.system.metrics.record_release();
        let pinned_for = self
            .system
            .registry
            .unregister(self.pin_id)
            .unwrap_or_else(|| self.pinned_at.elapsed());
        tracing::trace!(
            target: "flightrec_epoch::version",
            pin_id = self.pin_id,
            version = self.node.version(),
            pinned_for_us = pinned_for.as_micros(),
            "version pin released"
        );
        if pinned_for >= self.system.registry.stale_reader.warn_after {
            self.system.metrics.record_stale_warnings(1);
            tracing::warn!(
                target: "flightrec_epoch::version",
                pin_id = self.pin_id,
                pinned_for_ms = pinned_for.as_millis(),
                "version pin ended after stale threshold"
            );
        }
    }
}

/// The version system: tip pointer, pin registry, and metrics.
#[derive(Debug)]
pub struct VersionSystem {
    tip: RwLock<Arc<VersionNode>>,
    registry: PinRegistry,
    metrics: EpochMetrics,
}

impl VersionSystem {
    /// Initial published version number.
    pub const INITIAL_VERSION: u64 = 1;

    /// Create a system with the default stale-reader policy.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(StaleReaderConfig::default())
    }

    /// Create a system with an explicit stale-reader policy.
    #[must_use]
    pub fn with_config(stale_reader: StaleReaderConfig) -> Arc<Self> {
        Arc::new(Self {
            tip: RwLock::new(VersionNode::new(Self::INITIAL_VERSION, None)),
            registry: PinRegistry::new(stale_reader),
            metrics: EpochMetrics::new(),
        })
    }

    /// The current tip version number.
    #[must_use]
    pub fn tip_version(&self) -> u64 {
        self.tip.read().version()
    }

    /// Pin the current tip version.
    ///
    /// Concurrent checkouts never block each other; the reference increment
    /// happens under the tip read lock so a concurrent [`commit`](Self::commit)
    /// can never supersede a version between the read and the pin.
    #[must_use]
    pub fn checkout(self: &Arc<Self>) -> VersionHandle {
        let node = {
            let tip = self.tip.read();
            tip.refs.fetch_add(1, Ordering::AcqRel);
            Arc::clone(&tip)
        };
        let pinned_at = Instant::now();
        let pin_id = self.registry.register(node.version(), pinned_at);
        let active = self.registry.active_count() as u64;
        self.metrics.record_checkout(active);
        tracing::trace!(
            target: "flightrec_epoch::version",
            pin_id,
            version = node.version(),
            active_pins = active,
            "version checked out"
        );
        VersionHandle {
            system: Arc::clone(self),
            node,
            pin_id,
            pinned_at,
        }
    }

    /// Publish a new tip version after a structural modification.
    ///
    /// Marks the previous tip non-live and links it as the new node's `next`.
    /// Returns the new version number. Mutator-only; callers serialize
    /// externally (a structural modification lock).
    pub fn commit(&self) -> u64 {
        let mut tip = self.tip.write();
        let new = VersionNode::new(tip.version() + 1, Some(Arc::clone(&tip)));
        tip.live.store(false, Ordering::Release);
        let version = new.version();
        *tip = new;
        drop(tip);
        self.metrics.record_commit();
        tracing::trace!(
            target: "flightrec_epoch::version",
            version,
            "new version committed"
        );
        version
    }

    /// Block until every node strictly older than `version` has a zero
    /// reference count, then prune the drained suffix of the chain.
    ///
    /// On return the caller may safely free memory that was protected by
    /// those older versions. Mutator-only; busy-checks with a processor
    /// yield between passes (reader pin durations are short by contract).
    pub fn await_version(&self, version: u64) {
        self.metrics.record_await();
        let tip = Arc::clone(&self.tip.read());
        loop {
            if chain_drained_below(&tip, version) {
                break;
            }
            self.metrics.record_await_spin();
            let warned = self.registry.warn_on_stale(Instant::now());
            if warned > 0 {
                self.metrics.record_stale_warnings(warned as u64);
            }
            thread::yield_now();
        }
        prune_chain_below(&tip, version);
    }

    /// Number of outstanding pins on versions strictly older than
    /// `newer_than`. Diagnostic instrumentation for reclamation tests.
    #[must_use]
    pub fn stale_pin_count(&self, newer_than: u64) -> u64 {
        let mut total = 0;
        let mut current = Some(Arc::clone(&self.tip.read()));
        while let Some(node) = current {
            if node.version() < newer_than {
                total += node.ref_count();
            }
            current = node.next_node();
        }
        total
    }

    /// Number of nodes currently reachable from the tip (tip included).
    #[must_use]
    pub fn chain_len(&self) -> usize {
        let mut len = 0;
        let mut current = Some(Arc::clone(&self.tip.read()));
        while let Some(node) = current {
            len += 1;
            current = node.next_node();
        }
        len
    }

    /// Number of currently active pins.
    #[must_use]
    pub fn active_pins(&self) -> usize {
        self.registry.active_count()
    }

    /// Snapshot all stale pins as of `now`.
    #[must_use]
    pub fn stale_pin_snapshots(&self, now: Instant) -> Vec<PinSnapshot> {
        self.registry.stale_snapshots(now)
    }

    /// Point-in-time metrics.
    #[must_use]
    pub fn metrics(&self) -> &EpochMetrics {
        &self.metrics
    }
}

/// Whether every node strictly older than `version` below `tip` is
/// unreferenced.
fn chain_drained_below(tip: &Arc<VersionNode>, version: u64) -> bool {
    let mut current = Some(Arc::clone(tip));
    while let Some(node) = current {
        if node.version() < version && node.ref_count() != 0 {
            return false;
        }
        current = node.next_node();
    }
    true
}

/// Cut the chain at the oldest node with `node.version >= version`, dropping
/// the drained suffix.
fn prune_chain_below(tip: &Arc<VersionNode>, version: u64) {
    let mut current = Arc::clone(tip);
    loop {
        let next = current.next_node();
        match next {
            Some(next_node) if next_node.version() < version => {
                debug_assert_eq!(next_node.ref_count(), 0);
                debug_assert!(!next_node.is_live());
                current.next.lock().take();
                return;
            }
            Some(next_node) => current = next_node,
            None => return,
        }
    }
}
