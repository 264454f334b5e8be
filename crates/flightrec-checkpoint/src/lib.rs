//! Checkpoint records and constant-pool serialization.
//!
//! - [`writer`] — [`CheckpointWriter`], the destructor-finalized record
//!   writer: header reserve and backfill, context save/restore, rollback of
//!   empty records, and blob snapshotting.
//! - [`registry`] — [`SerializerRegistry`], which fans one rotation out to
//!   every registered [`ConstantPoolSerializer`] and manages cached-output
//!   replay.
//! - [`metrics`] — atomic counters for both.

pub mod metrics;
pub mod registry;
pub mod writer;

pub use metrics::{CheckpointMetrics, CheckpointMetricsSnapshot};
pub use registry::{CachePolicy, ConstantPoolSerializer, RotationSummary, SerializerRegistry};
pub use writer::{
    CheckpointContext, CheckpointWriter, PoolCheckpointWriter, CHECKPOINT_HEADER_SIZE,
};
