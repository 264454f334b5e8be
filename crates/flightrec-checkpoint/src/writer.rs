//! Checkpoint record writer.
//!
//! A [`CheckpointWriter`] opens a record by reserving the fixed 28-byte
//! header, lets serializers append pool tables through the typed host, and
//! finalizes in its destructor: the header is backfilled (padded size slot,
//! big-endian time fields, kind, entry count) so the backfill never shifts
//! the table data written past it. A record that ends with zero entries, or
//! whose writer went invalid, is rolled back wholesale instead of emitting an
//! empty or truncated record.

use std::sync::Arc;

use flightrec_error::{RecorderError, Result};
use flightrec_types::{CheckpointKind, PoolTypeId, Ticks, TraceId, WriterOptions};
use flightrec_writer::{Blob, BufferLease, ByteSink, WriterHost};

use crate::metrics::CheckpointMetrics;

/// Fixed byte length of the checkpoint record header.
pub const CHECKPOINT_HEADER_SIZE: usize = 28;

/// Width of the padded self-size slot at the head of the record.
const SIZE_SLOT_WIDTH: usize = 4;

const START_TIME_OFFSET: usize = 4;
const DURATION_OFFSET: usize = 12;
const KIND_OFFSET: usize = 20;
const ENTRY_COUNT_OFFSET: usize = 24;

/// Saved cursor-and-entry-count position inside an open record, used for
/// rollback of empty tables and for snapshotting serializer output.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointContext {
    pub(crate) offset: usize,
    pub(crate) entries: u32,
}

/// An open checkpoint record over a byte sink.
///
/// Finalization is destructor-driven: dropping the writer either backfills
/// the header and commits, or rewinds the sink to the record start.
#[derive(Debug)]
pub struct CheckpointWriter<S: ByteSink> {
    host: WriterHost<S>,
    start_offset: usize,
    start_time: Ticks,
    kind: CheckpointKind,
    entries: u32,
    metrics: Arc<CheckpointMetrics>,
}

/// The writer shape serializers are handed during a rotation.
pub type PoolCheckpointWriter = CheckpointWriter<BufferLease>;

impl<S: ByteSink> CheckpointWriter<S> {
    /// Open a record of `kind` over `sink`, reserving the header.
    pub fn new(sink: S, options: WriterOptions, kind: CheckpointKind) -> Result<Self> {
        Self::with_metrics(sink, options, kind, Arc::new(CheckpointMetrics::new()))
    }

    /// Open a record, recording into shared metrics.
    pub fn with_metrics(
        sink: S,
        options: WriterOptions,
        kind: CheckpointKind,
        metrics: Arc<CheckpointMetrics>,
    ) -> Result<Self> {
        let mut host = WriterHost::new(sink, options);
        let capacity = host.sink().available();
        let Some(start_offset) = host.reserve(CHECKPOINT_HEADER_SIZE) else {
            return Err(RecorderError::BufferExhausted {
                requested: CHECKPOINT_HEADER_SIZE,
                capacity,
            });
        };
        Ok(Self {
            host,
            start_offset,
            start_time: Ticks::now(),
            kind,
            entries: 0,
            metrics,
        })
    }

    /// The record kind this writer was opened with.
    #[must_use]
    pub const fn kind(&self) -> CheckpointKind {
        self.kind
    }

    /// Pool tables written so far.
    #[must_use]
    pub const fn entries(&self) -> u32 {
        self.entries
    }

    /// Whether every write so far was applied.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.host.is_valid()
    }

    /// Current append offset in the underlying sink.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.host.current_offset()
    }

    /// The typed writer, for table row fields.
    pub fn host_mut(&mut self) -> &mut WriterHost<S> {
        &mut self.host
    }

    /// The typed writer.
    #[must_use]
    pub fn host(&self) -> &WriterHost<S> {
        &self.host
    }

    /// Begin a pool table: write its type id and bump the entry count.
    pub fn write_type(&mut self, id: PoolTypeId) {
        self.host.write_unsigned(id.raw(), 8);
        self.entries += 1;
        self.metrics.record_table_written();
    }

    /// Write a table row key.
    pub fn write_key(&mut self, key: TraceId) {
        self.host.write_trace_id(key);
    }

    /// Credit `n` tables written outside this writer (cached blob replay).
    pub fn add_entries(&mut self, n: u32) {
        self.entries += n;
    }

    /// Save the cursor and entry count.
    #[must_use]
    pub fn context(&self) -> CheckpointContext {
        CheckpointContext {
            offset: self.host.current_offset(),
            entries: self.entries,
        }
    }

    /// Rewind to a previously saved context, discarding everything written
    /// since it was taken.
    pub fn set_context(&mut self, ctx: CheckpointContext) {
        self.host.seek(ctx.offset);
        self.entries = ctx.entries;
    }

    /// Snapshot bytes written since `ctx` (or since the header when absent)
    /// into a shared blob, leaving the record unchanged. `None` if the writer
    /// is invalid or the range is empty.
    pub fn copy(&mut self, ctx: Option<&CheckpointContext>) -> Option<Arc<Blob>> {
        if !self.host.is_valid() {
            return None;
        }
        let from = ctx.map_or(self.start_offset + CHECKPOINT_HEADER_SIZE, |c| c.offset);
        let to = self.host.current_offset();
        if to <= from {
            return None;
        }
        let blob = Blob::new(self.host.written()[from..to].to_vec());
        self.metrics.record_blob_cached();
        Some(blob)
    }

    /// Move bytes written since `ctx` out into a shared blob, rewinding the
    /// record to `ctx` as if they had never been written here.
    pub fn take(&mut self, ctx: CheckpointContext) -> Option<Arc<Blob>> {
        let blob = self.copy(Some(&ctx));
        self.set_context(ctx);
        blob
    }
}

impl<S: ByteSink> Drop for CheckpointWriter<S> {
    fn drop(&mut self) {
        if !self.host.is_valid() || self.entries == 0 {
            self.host.seek(self.start_offset);
            self.metrics.record_rollback();
            tracing::debug!(
                target: "flightrec_checkpoint::writer",
                kind = self.kind.as_str(),
                valid = self.host.is_valid(),
                "checkpoint record rolled back"
            );
            return;
        }

        let total = self.host.current_offset() - self.start_offset;
        let duration = Ticks::now().since(self.start_time);
        self.host
            .write_padded_at(self.start_offset, total as u64, SIZE_SLOT_WIDTH);
        self.host
            .write_fixed_at(self.start_offset + START_TIME_OFFSET, self.start_time.raw(), 8);
        self.host
            .write_fixed_at(self.start_offset + DURATION_OFFSET, duration.raw(), 8);
        self.host.write_fixed_at(
            self.start_offset + KIND_OFFSET,
            u64::from(self.kind.as_u32()),
            4,
        );
        self.host.write_fixed_at(
            self.start_offset + ENTRY_COUNT_OFFSET,
            u64::from(self.entries),
            4,
        );
        self.host.commit();
        self.metrics.record_finalized();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightrec_codec::{read_be, read_varint};
    use flightrec_types::StringTag;
    use flightrec_writer::{BufferPool, BufferPoolConfig};

    fn small_pool(capacity: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig {
            buffer_capacity_bytes: capacity,
            initial_buffers: 1,
            ..BufferPoolConfig::default()
        })
    }

    #[test]
    fn finalized_record_header_layout() {
        let pool = small_pool(4096);
        let metrics = Arc::new(CheckpointMetrics::new());
        {
            let mut w = CheckpointWriter::with_metrics(
                pool.lease(),
                WriterOptions::default(),
                CheckpointKind::Flush,
                Arc::clone(&metrics),
            )
            .unwrap();
            w.write_type(PoolTypeId::new(21));
            w.host_mut().write_u32(1);
            w.write_key(TraceId::new(5).unwrap());
            w.host_mut().write_str("main");
        }

        let bytes = pool.drain_committed();
        assert!(!bytes.is_empty());

        // Padded self-size slot, exactly 4 bytes, counts the whole record.
        assert_eq!(read_varint(&bytes[..4]), Some((bytes.len() as u64, 4)));

        // Fixed big-endian time fields.
        let (start_time, _) = read_be(&bytes[4..], 8).unwrap();
        let (duration, _) = read_be(&bytes[12..], 8).unwrap();
        assert!(duration < u64::MAX / 2, "duration is elapsed ticks");
        assert!(start_time < u64::MAX / 2, "start is ticks since the origin");

        assert_eq!(read_be(&bytes[20..], 4), Some((1, 4)), "kind: flush");
        assert_eq!(read_be(&bytes[24..], 4), Some((1, 4)), "one entry");

        // Body: type id, row count, key, utf-8 string.
        let body = &bytes[CHECKPOINT_HEADER_SIZE..];
        assert_eq!(read_varint(body), Some((21, 1)));
        assert_eq!(read_varint(&body[1..]), Some((1, 1)));
        assert_eq!(read_varint(&body[2..]), Some((5, 1)));
        assert_eq!(body[3], StringTag::Utf8.as_u8());

        assert_eq!(metrics.snapshot().records_finalized, 1);
        assert_eq!(metrics.snapshot().records_rolled_back, 0);
    }

    #[test]
    fn zero_entry_record_rolls_back() {
        let pool = small_pool(4096);
        let metrics = Arc::new(CheckpointMetrics::new());
        {
            let mut w = CheckpointWriter::with_metrics(
                pool.lease(),
                WriterOptions::default(),
                CheckpointKind::Generic,
                Arc::clone(&metrics),
            )
            .unwrap();
            // Stray field bytes without a table do not count as an entry.
            w.host_mut().write_u64(99);
        }

        assert!(pool.drain_committed().is_empty());
        assert_eq!(metrics.snapshot().records_rolled_back, 1);
        assert_eq!(metrics.snapshot().records_finalized, 0);
    }

    #[test]
    fn invalid_writer_rolls_back_instead_of_truncating() {
        let pool = small_pool(64);
        let metrics = Arc::new(CheckpointMetrics::new());
        {
            let mut w = CheckpointWriter::with_metrics(
                pool.lease(),
                WriterOptions::default(),
                CheckpointKind::Generic,
                Arc::clone(&metrics),
            )
            .unwrap();
            w.write_type(PoolTypeId::new(1));
            w.host_mut().write_bytes(&[0u8; 128]);
            assert!(!w.is_valid());
        }

        assert!(pool.drain_committed().is_empty());
        assert_eq!(metrics.snapshot().records_rolled_back, 1);
    }

    #[test]
    fn header_reservation_failure_is_an_error() {
        let pool = small_pool(16);
        let err = CheckpointWriter::new(
            pool.lease(),
            WriterOptions::default(),
            CheckpointKind::Generic,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RecorderError::BufferExhausted {
                requested: CHECKPOINT_HEADER_SIZE,
                ..
            }
        ));
    }

    #[test]
    fn context_rollback_discards_a_table() {
        let pool = small_pool(4096);
        {
            let mut w = CheckpointWriter::new(
                pool.lease(),
                WriterOptions::default(),
                CheckpointKind::Statics,
            )
            .unwrap();
            w.write_type(PoolTypeId::new(7));
            w.host_mut().write_u32(1);
            w.write_key(TraceId::new(1).unwrap());

            let ctx = w.context();
            w.write_type(PoolTypeId::new(8));
            assert_eq!(w.entries(), 2);
            w.set_context(ctx);
            assert_eq!(w.entries(), 1);
        }

        let bytes = pool.drain_committed();
        assert_eq!(read_be(&bytes[24..], 4), Some((1, 4)), "one entry survives");
    }

    #[test]
    fn copy_snapshots_body_without_disturbing_the_record() {
        let pool = small_pool(4096);
        {
            let mut w = CheckpointWriter::new(
                pool.lease(),
                WriterOptions::default(),
                CheckpointKind::Statics,
            )
            .unwrap();
            assert!(w.copy(None).is_none(), "empty body has nothing to copy");

            w.write_type(PoolTypeId::new(3));
            w.host_mut().write_u32(0x1234);
            let before = w.current_offset();
            let blob = w.copy(None).unwrap();
            assert_eq!(w.current_offset(), before, "copy leaves the cursor");
            assert_eq!(
                blob.data(),
                &w.host().written()[CHECKPOINT_HEADER_SIZE..before]
            );
        }
        assert!(!pool.drain_committed().is_empty());
    }

    #[test]
    fn take_moves_bytes_out_and_rewinds() {
        let pool = small_pool(4096);
        let blob = {
            let mut w = CheckpointWriter::new(
                pool.lease(),
                WriterOptions::default(),
                CheckpointKind::Statics,
            )
            .unwrap();
            let ctx = w.context();
            w.write_type(PoolTypeId::new(9));
            w.host_mut().write_u32(2);
            let blob = w.take(ctx).unwrap();
            assert_eq!(w.entries(), 0, "taken table no longer counts here");
            blob
        };

        // The record itself rolled back (zero entries); the blob keeps the
        // bytes for a later record.
        assert!(pool.drain_committed().is_empty());
        assert_eq!(read_varint(blob.data()), Some((9, 1)));
    }
}
