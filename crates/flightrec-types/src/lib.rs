//! Core types shared across the flightrec checkpoint/constant-pool core.
//!
//! Everything a serializer or writer layer needs to name things lives here:
//! [`TraceId`] (the opaque 64-bit entity identifier used as a constant-pool
//! key), [`PoolTypeId`] (the tag of one typed table), [`Ticks`] (the recorder
//! clock), [`CheckpointKind`], the string-payload tag byte, and the
//! per-writer [`WriterOptions`].

pub mod clock;

pub use clock::Ticks;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque monotonic 64-bit identifier naming a loggable entity (thread,
/// thread group, stack trace, klass, method, string).
///
/// Zero is reserved for "absent" ([`TraceId::NONE`]); every id handed out by
/// a [`TraceIdIssuer`] is nonzero. An id is never reused while referenced by
/// an unflushed checkpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TraceId(u64);

impl TraceId {
    /// The "absent entity" sentinel. Written for null taggable references.
    pub const NONE: Self = Self(0);

    /// Create a trace id from a raw value.
    ///
    /// Returns `None` for 0 (use [`TraceId::NONE`] explicitly for absence).
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Get the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this id is the absent sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when attempting to create a `TraceId` from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTraceId;

impl fmt::Display for InvalidTraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace id 0 is reserved for the absent sentinel")
    }
}

impl std::error::Error for InvalidTraceId {}

impl TryFrom<u64> for TraceId {
    type Error = InvalidTraceId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidTraceId)
    }
}

/// Monotonic issuer of nonzero [`TraceId`]s.
///
/// Thread-safe; ids are strictly increasing across all issuing threads.
#[derive(Debug)]
pub struct TraceIdIssuer {
    next: AtomicU64,
}

impl TraceIdIssuer {
    /// Create an issuer whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Issue the next trace id.
    #[must_use]
    pub fn next_id(&self) -> TraceId {
        TraceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`next_id`](Self::next_id) would return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for TraceIdIssuer {
    fn default() -> Self {
        Self::new()
    }
}

/// An entity that can be referenced from a checkpoint table by its stable
/// trace id (thread, thread group, stack trace, klass, method, ...).
///
/// Writers resolve a taggable reference to its id and emit that id with the
/// configured integer codec; a null reference is written as [`TraceId::NONE`].
pub trait Taggable {
    /// The stable trace id of this entity.
    fn trace_id(&self) -> TraceId;
}

impl<T: Taggable + ?Sized> Taggable for &T {
    fn trace_id(&self) -> TraceId {
        (**self).trace_id()
    }
}

/// Tag of one typed constant-pool table within a checkpoint record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct PoolTypeId(u64);

impl PoolTypeId {
    /// Create a pool type id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind discriminator in the fixed checkpoint header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum CheckpointKind {
    /// Ordinary per-epoch checkpoint.
    Generic = 0,
    /// Emitted as part of a flush of in-flight data.
    Flush = 1,
    /// Chunk-header support checkpoint.
    Header = 2,
    /// Constant pools serialized once per rotation.
    Statics = 3,
    /// Thread-scoped constant data.
    Threads = 4,
}

impl CheckpointKind {
    /// Stable wire value (fixed 4-byte header field).
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Short name for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Flush => "flush",
            Self::Header => "header",
            Self::Statics => "statics",
            Self::Threads => "threads",
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-byte tag preceding every string payload.
///
/// `Null` and `Empty` stand alone; every other tag is followed by a length
/// field (integer codec) and that many bytes/units of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StringTag {
    /// Absent string; no payload follows.
    Null = 0,
    /// Zero-length string; no payload follows.
    Empty = 1,
    /// Reference to a string constant by trace id.
    Constant = 2,
    /// UTF-8 bytes.
    Utf8 = 3,
    /// UTF-16 code units, each written with the integer codec.
    Utf16 = 4,
    /// Latin-1 bytes.
    Latin1 = 5,
}

impl StringTag {
    /// Wire value of the tag byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Integer-codec selection for a writer instance.
///
/// Chosen once per writer from process-wide options; every length, id, and
/// count the writer emits uses this codec unless the field is documented as
/// fixed-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IntegerEncoding {
    /// Base-128 varint, least-significant group first ("compressed integer").
    Compressed,
    /// Fixed-width big-endian.
    BigEndian,
}

/// Per-writer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WriterOptions {
    /// Integer codec for non-fixed fields.
    pub encoding: IntegerEncoding,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            encoding: IntegerEncoding::Compressed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_zero_is_absent() {
        assert!(TraceId::new(0).is_none());
        assert!(TraceId::NONE.is_none());
        assert_eq!(TraceId::NONE.raw(), 0);
        assert!(TraceId::try_from(0).is_err());
    }

    #[test]
    fn trace_id_roundtrip() {
        let id = TraceId::new(42).unwrap();
        assert_eq!(id.raw(), 42);
        assert!(!id.is_none());
        assert_eq!(TraceId::try_from(42).unwrap(), id);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn issuer_is_monotonic_and_nonzero() {
        let issuer = TraceIdIssuer::new();
        assert_eq!(issuer.peek(), 1);
        let a = issuer.next_id();
        let b = issuer.next_id();
        let c = issuer.next_id();
        assert!(!a.is_none());
        assert!(a.raw() < b.raw());
        assert!(b.raw() < c.raw());
        assert_eq!(issuer.peek(), c.raw() + 1, "peek does not consume an id");
    }

    #[test]
    fn issuer_is_monotonic_across_threads() {
        use std::sync::Arc;

        let issuer = Arc::new(TraceIdIssuer::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let issuer = Arc::clone(&issuer);
            handles.push(std::thread::spawn(move || {
                (0..256).map(|_| issuer.next_id().raw()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("issuer thread must not panic"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4 * 256, "issued ids must be unique");
        assert!(all.iter().all(|&raw| raw != 0));
    }

    #[test]
    fn checkpoint_kind_wire_values_are_stable() {
        assert_eq!(CheckpointKind::Generic.as_u32(), 0);
        assert_eq!(CheckpointKind::Flush.as_u32(), 1);
        assert_eq!(CheckpointKind::Header.as_u32(), 2);
        assert_eq!(CheckpointKind::Statics.as_u32(), 3);
        assert_eq!(CheckpointKind::Threads.as_u32(), 4);
        assert_eq!(CheckpointKind::Statics.as_str(), "statics");
    }

    #[test]
    fn string_tags_are_stable() {
        assert_eq!(StringTag::Null.as_u8(), 0);
        assert_eq!(StringTag::Empty.as_u8(), 1);
        assert_eq!(StringTag::Constant.as_u8(), 2);
        assert_eq!(StringTag::Utf8.as_u8(), 3);
        assert_eq!(StringTag::Utf16.as_u8(), 4);
        assert_eq!(StringTag::Latin1.as_u8(), 5);
    }

    #[test]
    fn writer_options_default_to_compressed() {
        assert_eq!(
            WriterOptions::default().encoding,
            IntegerEncoding::Compressed
        );
    }

    #[test]
    fn ids_and_options_roundtrip_through_serde() {
        let id = TraceId::new(42).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "42", "ids are bare numbers");
        let back: TraceId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);

        let options = WriterOptions {
            encoding: IntegerEncoding::BigEndian,
        };
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"{"encoding":"BigEndian"}"#);
        let back: WriterOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn taggable_through_reference() {
        struct Thing(TraceId);
        impl Taggable for Thing {
            fn trace_id(&self) -> TraceId {
                self.0
            }
        }

        let t = Thing(TraceId::new(7).unwrap());
        let r: &Thing = &t;
        assert_eq!(r.trace_id().raw(), 7);
    }
}
