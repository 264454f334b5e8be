//! Constant-pool serializer registry.
//!
//! Serializers register once per pool type and are invoked together on each
//! rotation, all into a single checkpoint record. The registry owns the
//! rollback-on-empty rule (a serializer that writes no rows leaves no trace
//! in the record) and the blob cache: a serializer whose output is declared
//! cacheable is invoked once, snapshotted, and replayed verbatim on later
//! rotations until the cache is invalidated.

use std::sync::Arc;

use parking_lot::Mutex;

use flightrec_error::Result;
use flightrec_types::{CheckpointKind, PoolTypeId, WriterOptions};
use flightrec_writer::{Blob, BufferPool};

use crate::metrics::CheckpointMetrics;
use crate::writer::{CheckpointWriter, PoolCheckpointWriter};

/// A producer of one constant-pool table.
///
/// `serialize` is called with an open checkpoint record; the type id has
/// already been written, so the implementation writes the row count followed
/// by the rows. Writing nothing at all cancels the table.
pub trait ConstantPoolSerializer: Send {
    /// Append the pool's row count and rows.
    fn serialize(&mut self, writer: &mut PoolCheckpointWriter);

    /// Hook called after each rotation completes. Serializers that track
    /// epoch-local state (new-since-last-rotation sets) clear it here.
    fn on_rotation(&mut self) {}
}

/// How a serializer's output may be reused across rotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Invoke the serializer on every rotation.
    Uncached,
    /// Invoke once, replay the snapshot forever after.
    Cached,
    /// Invoke once per rotation cycle; the snapshot is dropped when the
    /// rotation hook runs.
    CachedUntilRotation,
}

#[derive(Debug)]
struct CachedBlob {
    blob: Arc<Blob>,
    entries: u32,
}

struct SerializerRegistration {
    id: PoolTypeId,
    policy: CachePolicy,
    serializer: Box<dyn ConstantPoolSerializer>,
    cached: Option<CachedBlob>,
}

struct RegistryInner {
    registrations: Vec<SerializerRegistration>,
    recording_active: bool,
}

/// Per-rotation accounting returned by [`SerializerRegistry::write_constant_pools`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationSummary {
    pub serializers_invoked: usize,
    pub tables_written: usize,
    pub blobs_replayed: usize,
    pub empty_rolled_back: usize,
}

/// Registry of constant-pool serializers, one per pool type.
pub struct SerializerRegistry {
    inner: Mutex<RegistryInner>,
    pool: BufferPool,
    options: WriterOptions,
    metrics: Arc<CheckpointMetrics>,
}

impl SerializerRegistry {
    /// Create a registry writing through `pool` with the given codec options.
    #[must_use]
    pub fn new(pool: BufferPool, options: WriterOptions) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                registrations: Vec::new(),
                recording_active: false,
            }),
            pool,
            options,
            metrics: Arc::new(CheckpointMetrics::new()),
        }
    }

    /// The buffer pool rotations write into.
    #[must_use]
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Checkpoint metrics shared by every record this registry opens.
    #[must_use]
    pub fn metrics(&self) -> &CheckpointMetrics {
        &self.metrics
    }

    /// Number of registered serializers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().registrations.is_empty()
    }

    /// Mark recording as started: registrations from now on are serialized
    /// immediately so the stream never lacks a pool a live event refers to.
    pub fn start_recording(&self) {
        self.inner.lock().recording_active = true;
    }

    /// Mark recording as stopped.
    pub fn stop_recording(&self) {
        self.inner.lock().recording_active = false;
    }

    /// Register `serializer` for pool type `id`. A duplicate id is a caller
    /// bug: rejected, with the original registration left in place.
    pub fn register(
        &self,
        id: PoolTypeId,
        policy: CachePolicy,
        serializer: Box<dyn ConstantPoolSerializer>,
    ) {
        let mut inner = self.inner.lock();
        if inner.registrations.iter().any(|r| r.id == id) {
            debug_assert!(false, "pool type {} registered twice", id.raw());
            tracing::warn!(
                target: "flightrec_checkpoint::registry",
                type_id = id.raw(),
                "duplicate constant-pool registration ignored"
            );
            return;
        }

        let mut registration = SerializerRegistration {
            id,
            policy,
            serializer,
            cached: None,
        };

        if inner.recording_active {
            // Late registration: emit this pool now, in its own record, so
            // events already flowing can resolve against it.
            self.invoke_now(&mut registration);
        }

        inner.registrations.push(registration);
    }

    fn invoke_now(&self, registration: &mut SerializerRegistration) {
        let lease = match self.pool.try_lease() {
            Ok(lease) => lease,
            Err(err) => {
                tracing::warn!(
                    target: "flightrec_checkpoint::registry",
                    type_id = registration.id.raw(),
                    %err,
                    "late registration not serialized"
                );
                return;
            }
        };
        let Ok(mut writer) = CheckpointWriter::with_metrics(
            lease,
            self.options,
            CheckpointKind::Statics,
            Arc::clone(&self.metrics),
        ) else {
            return;
        };
        let mut summary = RotationSummary::default();
        Self::invoke_one(&mut writer, registration, &self.metrics, &mut summary);
    }

    /// Invoke every serializer into one checkpoint record of kind
    /// [`CheckpointKind::Statics`]. The record finalizes (or rolls back, if
    /// every table came up empty) when the writer drops at the end of the
    /// call.
    pub fn write_constant_pools(&self) -> Result<RotationSummary> {
        let mut inner = self.inner.lock();
        let lease = self.pool.try_lease()?;
        let mut writer = CheckpointWriter::with_metrics(
            lease,
            self.options,
            CheckpointKind::Statics,
            Arc::clone(&self.metrics),
        )?;

        let mut summary = RotationSummary::default();
        for registration in &mut inner.registrations {
            Self::invoke_one(&mut writer, registration, &self.metrics, &mut summary);
        }
        Ok(summary)
    }

    /// Full rotation: write every pool, then run the rotation hooks and drop
    /// rotation-scoped caches.
    pub fn rotate(&self) -> Result<RotationSummary> {
        let summary = self.write_constant_pools()?;
        self.on_rotation();
        Ok(summary)
    }

    /// Run every serializer's rotation hook and invalidate
    /// [`CachePolicy::CachedUntilRotation`] snapshots.
    pub fn on_rotation(&self) {
        let mut inner = self.inner.lock();
        for registration in &mut inner.registrations {
            registration.serializer.on_rotation();
            if registration.policy == CachePolicy::CachedUntilRotation {
                registration.cached = None;
            }
        }
    }

    fn invoke_one(
        writer: &mut PoolCheckpointWriter,
        registration: &mut SerializerRegistration,
        metrics: &CheckpointMetrics,
        summary: &mut RotationSummary,
    ) {
        summary.serializers_invoked += 1;

        if let Some(cached) = &registration.cached {
            cached.blob.write(writer.host_mut());
            writer.add_entries(cached.entries);
            metrics.record_blob_replay();
            summary.blobs_replayed += 1;
            return;
        }

        let ctx = writer.context();
        writer.write_type(registration.id);
        let probe = writer.current_offset();
        registration.serializer.serialize(writer);

        if writer.current_offset() == probe {
            // Nothing produced: undo the type id so the record carries no
            // empty table.
            writer.set_context(ctx);
            metrics.record_empty_table();
            summary.empty_rolled_back += 1;
            return;
        }
        summary.tables_written += 1;

        if matches!(
            registration.policy,
            CachePolicy::Cached | CachePolicy::CachedUntilRotation
        ) {
            let entries = writer.entries() - ctx.entries;
            if let Some(blob) = writer.copy(Some(&ctx)) {
                registration.cached = Some(CachedBlob { blob, entries });
            }
        }
    }
}
