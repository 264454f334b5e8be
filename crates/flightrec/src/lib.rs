//! Flight-recorder checkpoint and constant-pool serialization core.
//!
//! This facade re-exports the recorder's building blocks in dependency
//! order:
//!
//! - [`types`] — trace ids, pool type ids, checkpoint kinds, string tags,
//!   writer options, and the recorder clock.
//! - [`error`] — the recorder error type and `Result` alias.
//! - [`codec`] — big-endian and LSB-first base-128 integer encodings,
//!   including the padded forms used for backfilled size slots.
//! - [`writer`] — byte sinks, buffer leasing, the typed writer host,
//!   transactional event framing, and replayable blobs.
//! - [`checkpoint`] — the destructor-finalized checkpoint record writer and
//!   the constant-pool serializer registry.
//! - [`epoch`] — version checkout/commit/await, the reclamation protocol
//!   rotations rely on to know every writer has moved past an old epoch.

pub use flightrec_checkpoint as checkpoint;
pub use flightrec_codec as codec;
pub use flightrec_epoch as epoch;
pub use flightrec_error as error;
pub use flightrec_types as types;
pub use flightrec_writer as writer;

pub use flightrec_checkpoint::{
    CachePolicy, CheckpointMetrics, CheckpointWriter, ConstantPoolSerializer,
    PoolCheckpointWriter, SerializerRegistry, CHECKPOINT_HEADER_SIZE,
};
pub use flightrec_epoch::{VersionHandle, VersionSystem};
pub use flightrec_error::{RecorderError, Result};
pub use flightrec_types::{
    CheckpointKind, IntegerEncoding, PoolTypeId, StringTag, Taggable, Ticks, TraceId,
    TraceIdIssuer, WriterOptions,
};
pub use flightrec_writer::{
    Blob, BufferLease, BufferPool, BufferPoolConfig, ByteSink, EventWriterHost, WriterHost,
    MAX_SMALL_FRAME_SIZE,
};
