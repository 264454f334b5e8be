//! Transactional event framing on top of [`WriterHost`].
//!
//! `begin_event_write` reserves a size prefix (1 byte for small frames,
//! 4 bytes for large), `end_event_write` backfills it with the total frame
//! size — including the prefix itself — and commits the segment. A small
//! frame whose size exceeds the one-byte slot is discarded wholesale: small
//! framing trades maximum representable size for a tighter header, and
//! overflow cancels rather than corrupting the stream. The discard is
//! deliberate, silent, and bounded to the single event.

use std::sync::Arc;

use crate::host::WriterHost;
use crate::metrics::WriterMetrics;
use crate::sink::ByteSink;

/// Largest total size (prefix included) representable by a small frame's
/// one-byte, non-continued size slot.
pub const MAX_SMALL_FRAME_SIZE: usize = 127;

const LARGE_PREFIX_WIDTH: usize = 4;
const SMALL_PREFIX_WIDTH: usize = 1;

#[derive(Debug, Clone, Copy)]
struct Frame {
    start: usize,
    large: bool,
}

/// Event/checkpoint writer host: a [`WriterHost`] plus begin/end brackets.
#[derive(Debug)]
pub struct EventWriterHost<S: ByteSink> {
    host: WriterHost<S>,
    frame: Option<Frame>,
    metrics: Arc<WriterMetrics>,
}

impl<S: ByteSink> EventWriterHost<S> {
    /// Wrap a typed writer host.
    #[must_use]
    pub fn new(host: WriterHost<S>) -> Self {
        Self::with_metrics(host, Arc::new(WriterMetrics::new()))
    }

    /// Wrap a typed writer host, recording into shared metrics.
    #[must_use]
    pub fn with_metrics(host: WriterHost<S>, metrics: Arc<WriterMetrics>) -> Self {
        Self {
            host,
            frame: None,
            metrics,
        }
    }

    /// The inner typed writer, for body writes between begin and end.
    pub fn host_mut(&mut self) -> &mut WriterHost<S> {
        &mut self.host
    }

    /// The inner typed writer.
    #[must_use]
    pub fn host(&self) -> &WriterHost<S> {
        &self.host
    }

    /// Whether a frame is currently open.
    #[must_use]
    pub const fn in_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Open a frame, reserving the size prefix. Returns `false` (and opens
    /// nothing) if the writer is invalid or the reservation fails.
    pub fn begin_event_write(&mut self, large: bool) -> bool {
        debug_assert!(self.frame.is_none(), "event frames do not nest");
        let width = if large {
            LARGE_PREFIX_WIDTH
        } else {
            SMALL_PREFIX_WIDTH
        };
        match self.host.reserve(width) {
            Some(start) => {
                self.frame = Some(Frame { start, large });
                true
            }
            None => false,
        }
    }

    /// Close the frame: backfill the size prefix (padded encoding, so the
    /// backfill never shifts data) and commit, or discard the whole frame if
    /// a small frame outgrew its one-byte slot. Returns the committed frame
    /// size in bytes, 0 when the frame was discarded.
    pub fn end_event_write(&mut self) -> usize {
        let Some(frame) = self.frame.take() else {
            debug_assert!(false, "end_event_write without begin");
            return 0;
        };

        if !self.host.is_valid() {
            // Allocation failure mid-frame: abandon the whole event.
            self.host.seek(frame.start);
            return 0;
        }

        let total = self.host.current_offset() - frame.start;
        if !frame.large && total > MAX_SMALL_FRAME_SIZE {
            self.metrics.record_event_discarded();
            tracing::debug!(
                target: "flightrec_writer::event",
                size = total,
                limit = MAX_SMALL_FRAME_SIZE,
                "small-framed event oversized; discarding"
            );
            self.host.seek(frame.start);
            return 0;
        }

        let width = if frame.large {
            LARGE_PREFIX_WIDTH
        } else {
            SMALL_PREFIX_WIDTH
        };
        self.host.write_padded_at(frame.start, total as u64, width);
        self.host.commit();
        self.metrics.record_event_committed();
        total
    }
}
