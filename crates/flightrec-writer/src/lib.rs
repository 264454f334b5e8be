//! Typed binary writer stack for the recorder.
//!
//! Layered bottom-up:
//!
//! - [`sink`] — the [`ByteSink`] abstraction (append cursor with
//!   reserve/seek/patch/commit) and its growable in-memory implementation.
//! - [`pool`] — buffer leasing: a [`BufferLease`] grants one writer exclusive
//!   use of a backing buffer for its whole lifetime.
//! - [`host`] — [`WriterHost`], the typed cursor that turns integers, floats,
//!   strings, and taggable references into encoded bytes.
//! - [`event`] — [`EventWriterHost`], transactional begin/end framing with a
//!   backfilled size prefix and silent discard of oversized small frames.
//! - [`blob`] — [`Blob`], an immutable reference-counted chainable byte-range
//!   snapshot used for caching and replay.

pub mod blob;
pub mod event;
pub mod host;
pub mod metrics;
pub mod pool;
pub mod sink;

pub use blob::Blob;
pub use event::{EventWriterHost, MAX_SMALL_FRAME_SIZE};
pub use host::WriterHost;
pub use metrics::{WriterMetrics, WriterMetricsSnapshot};
pub use pool::{BufferLease, BufferPool, BufferPoolConfig};
pub use sink::{ByteSink, GrowableBuffer};
