//! Typed writer host: a generic binary cursor over a byte sink.
//!
//! Converts typed values (integers, floats, strings, booleans, timestamps,
//! taggable references) into encoded bytes at the current cursor position,
//! using the integer codec selected once per writer instance. Fields the wire
//! format declares as fixed (timestamps, checkpoint kind, entry count) are
//! always big-endian regardless of the configured codec.
//!
//! Failure semantics: any allocation failure marks the writer invalid; all
//! subsequent writes become no-ops. Callers must check [`WriterHost::is_valid`]
//! before trusting [`WriterHost::current_offset`].

use flightrec_codec::{write_be, Encoder, MAX_VARINT_LEN};
use flightrec_types::{StringTag, Taggable, Ticks, TraceId, WriterOptions};

/// Byte width of a Latin-1/UTF-8 unit vs UTF-16 unit, as declared to the
/// integer codec when writing string payload units.
const UTF16_UNIT_WIDTH: usize = 2;

/// A typed binary cursor over a [`ByteSink`](crate::sink::ByteSink).
#[derive(Debug)]
pub struct WriterHost<S: crate::sink::ByteSink> {
    sink: S,
    encoder: Encoder,
    valid: bool,
}

impl<S: crate::sink::ByteSink> WriterHost<S> {
    /// Create a writer over `sink` with the codec from `options`.
    #[must_use]
    pub fn new(sink: S, options: WriterOptions) -> Self {
        Self {
            sink,
            encoder: Encoder::new(options.encoding),
            valid: true,
        }
    }

    /// Whether all writes so far have been applied. Once false, every
    /// subsequent write is a no-op and offsets are not trustworthy.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// The integer codec in use.
    #[must_use]
    pub const fn encoder(&self) -> Encoder {
        self.encoder
    }

    /// Current append offset.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.sink.position()
    }

    /// Rewind (or restore) the append cursor.
    pub fn seek(&mut self, offset: usize) {
        self.sink.seek(offset);
    }

    /// Advance the cursor by `len` bytes without content, returning the
    /// pre-reservation offset for later backfill. Marks the writer invalid
    /// and returns `None` if the sink cannot grow.
    pub fn reserve(&mut self, len: usize) -> Option<usize> {
        if !self.valid {
            return None;
        }
        let reserved = self.sink.reserve(len);
        if reserved.is_none() {
            self.invalidate("reserve");
        }
        reserved
    }

    /// Borrow the written bytes (up to the high-water mark).
    #[must_use]
    pub fn written(&self) -> &[u8] {
        self.sink.written()
    }

    /// Mark everything up to the cursor as committed.
    pub fn commit(&mut self) {
        self.sink.commit();
    }

    /// Consume the writer, returning the underlying sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn invalidate(&mut self, op: &'static str) {
        self.valid = false;
        tracing::debug!(
            target: "flightrec_writer::host",
            op,
            offset = self.sink.position(),
            available = self.sink.available(),
            "writer invalidated: sink cannot grow"
        );
    }

    fn put(&mut self, bytes: &[u8]) {
        if !self.valid {
            return;
        }
        if !self.sink.put(bytes) {
            self.invalidate("put");
        }
    }

    /// Encode `value` with the configured codec at the cursor. `width` is the
    /// declared byte width of the value (1, 2, 4, or 8).
    pub fn write_unsigned(&mut self, value: u64, width: usize) {
        let mut tmp = [0u8; MAX_VARINT_LEN];
        let n = self.encoder.encode(&mut tmp, value, width);
        self.put(&tmp[..n]);
    }

    /// Encode `value` with the codec's fixed maximal form for a `width`-byte
    /// slot at the cursor.
    pub fn write_padded(&mut self, value: u64, width: usize) {
        let mut tmp = [0u8; MAX_VARINT_LEN];
        let n = self.encoder.encode_padded(&mut tmp, value, width);
        self.put(&tmp[..n]);
    }

    /// Backfill a previously reserved `width`-byte slot at `offset` with the
    /// codec's padded form. The cursor is unchanged, so data written after
    /// the slot is undisturbed.
    pub fn write_padded_at(&mut self, offset: usize, value: u64, width: usize) {
        if !self.valid {
            return;
        }
        let mut tmp = [0u8; MAX_VARINT_LEN];
        let n = self.encoder.encode_padded(&mut tmp, value, width);
        if !self.sink.patch(offset, &tmp[..n]) {
            self.invalidate("patch");
        }
    }

    /// Backfill a fixed big-endian `width`-byte field at `offset`,
    /// independent of the configured codec.
    pub fn write_fixed_at(&mut self, offset: usize, value: u64, width: usize) {
        if !self.valid {
            return;
        }
        let mut tmp = [0u8; 8];
        let n = write_be(&mut tmp, value, width);
        if !self.sink.patch(offset, &tmp[..n]) {
            self.invalidate("patch");
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_unsigned(u64::from(value), 1);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_unsigned(u64::from(value), 2);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_unsigned(u64::from(value), 4);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_unsigned(value, 8);
    }

    /// Signed values are cast to the unsigned representation of equal bit
    /// width before encoding (no sign extension to 64 bits).
    pub fn write_i8(&mut self, value: i8) {
        self.write_unsigned(u64::from(value as u8), 1);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_unsigned(u64::from(value as u16), 2);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_unsigned(u64::from(value as u32), 4);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_unsigned(value as u64, 8);
    }

    /// One raw byte: 1 for true, 0 for false.
    pub fn write_bool(&mut self, value: bool) {
        self.put(&[u8::from(value)]);
    }

    /// Floats are written by bit reinterpretation, fixed big-endian.
    pub fn write_f32(&mut self, value: f32) {
        let mut tmp = [0u8; 8];
        let n = write_be(&mut tmp, u64::from(value.to_bits()), 4);
        self.put(&tmp[..n]);
    }

    pub fn write_f64(&mut self, value: f64) {
        let mut tmp = [0u8; 8];
        let n = write_be(&mut tmp, value.to_bits(), 8);
        self.put(&tmp[..n]);
    }

    /// Raw byte span, no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes);
    }

    /// Fixed 8-byte big-endian tick field (checkpoint header timestamps).
    pub fn write_ticks(&mut self, ticks: Ticks) {
        let mut tmp = [0u8; 8];
        write_be(&mut tmp, ticks.raw(), 8);
        self.put(&tmp);
    }

    /// A trace id, encoded with the integer codec. [`TraceId::NONE`] encodes
    /// as 0.
    pub fn write_trace_id(&mut self, id: TraceId) {
        self.write_unsigned(id.raw(), 8);
    }

    /// Resolve a taggable entity to its trace id and write that id.
    pub fn write_taggable<T: Taggable + ?Sized>(&mut self, entity: &T) {
        self.write_trace_id(entity.trace_id());
    }

    /// A possibly-absent taggable reference; `None` writes [`TraceId::NONE`].
    pub fn write_taggable_opt<T: Taggable>(&mut self, entity: Option<&T>) {
        match entity {
            Some(entity) => self.write_taggable(entity),
            None => self.write_trace_id(TraceId::NONE),
        }
    }

    /// A possibly-absent UTF-8 string: `None` emits the null tag, empty the
    /// empty tag, anything else the UTF-8 tag + length + raw bytes.
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            None => self.put(&[StringTag::Null.as_u8()]),
            Some("") => self.put(&[StringTag::Empty.as_u8()]),
            Some(s) => {
                self.put(&[StringTag::Utf8.as_u8()]);
                self.write_unsigned(s.len() as u64, 4);
                self.put(s.as_bytes());
            }
        }
    }

    /// A present UTF-8 string (empty still emits the empty tag).
    pub fn write_str(&mut self, value: &str) {
        self.write_string(Some(value));
    }

    /// A string referenced from the string constant pool by trace id.
    pub fn write_string_constant(&mut self, id: TraceId) {
        self.put(&[StringTag::Constant.as_u8()]);
        self.write_trace_id(id);
    }

    /// UTF-16 payload: tag + unit count + each code unit via the integer
    /// codec.
    pub fn write_utf16(&mut self, units: &[u16]) {
        if units.is_empty() {
            self.put(&[StringTag::Empty.as_u8()]);
            return;
        }
        self.put(&[StringTag::Utf16.as_u8()]);
        self.write_unsigned(units.len() as u64, 4);
        for &unit in units {
            self.write_unsigned(u64::from(unit), UTF16_UNIT_WIDTH);
        }
    }

    /// Latin-1 payload: tag + byte count + raw bytes.
    pub fn write_latin1(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            self.put(&[StringTag::Empty.as_u8()]);
            return;
        }
        self.put(&[StringTag::Latin1.as_u8()]);
        self.write_unsigned(bytes.len() as u64, 4);
        self.put(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ByteSink, GrowableBuffer};
    use flightrec_codec::{read_be, read_varint};
    use flightrec_types::{IntegerEncoding, StringTag, TraceId, WriterOptions};

    fn compressed_host(capacity: usize) -> WriterHost<GrowableBuffer> {
        WriterHost::new(GrowableBuffer::new(capacity), WriterOptions::default())
    }

    fn live(host: &WriterHost<GrowableBuffer>) -> &[u8] {
        &host.written()[..host.current_offset()]
    }

    #[test]
    fn integers_use_configured_codec() {
        let mut host = compressed_host(64);
        host.write_u32(300);
        assert_eq!(read_varint(live(&host)), Some((300, 2)));

        let mut host = WriterHost::new(
            GrowableBuffer::new(64),
            WriterOptions {
                encoding: IntegerEncoding::BigEndian,
            },
        );
        host.write_u32(300);
        assert_eq!(read_be(live(&host), 4), Some((300, 4)));
    }

    #[test]
    fn signed_casts_keep_declared_width() {
        let mut host = compressed_host(64);
        host.write_i32(-1);
        let (value, n) = read_varint(live(&host)).unwrap();
        assert_eq!(value, u64::from(u32::MAX));
        assert_eq!(n, 5);
    }

    #[test]
    fn bool_and_floats_are_fixed_width() {
        let mut host = compressed_host(64);
        host.write_bool(true);
        host.write_bool(false);
        host.write_f32(1.5);
        host.write_f64(-2.25);

        let bytes = live(&host);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[2..6], &1.5f32.to_bits().to_be_bytes());
        assert_eq!(&bytes[6..14], &(-2.25f64).to_bits().to_be_bytes());
    }

    #[test]
    fn string_null_and_empty_are_one_tag_byte() {
        let mut host = compressed_host(64);
        host.write_string(None);
        host.write_string(Some(""));
        assert_eq!(
            live(&host),
            &[StringTag::Null.as_u8(), StringTag::Empty.as_u8()]
        );
    }

    #[test]
    fn utf8_string_layout() {
        let mut host = compressed_host(64);
        host.write_str("abc");
        let bytes = live(&host);
        assert_eq!(bytes[0], StringTag::Utf8.as_u8());
        let (len, consumed) = read_varint(&bytes[1..]).unwrap();
        assert_eq!(len, 3);
        assert_eq!(&bytes[1 + consumed..], b"abc");
    }

    #[test]
    fn utf16_and_latin1_layouts() {
        let mut host = compressed_host(64);
        host.write_utf16(&[0x41, 0xF600]);
        let bytes = live(&host).to_vec();
        assert_eq!(bytes[0], StringTag::Utf16.as_u8());
        let (count, mut at) = read_varint(&bytes[1..]).map(|(v, n)| (v, 1 + n)).unwrap();
        assert_eq!(count, 2);
        for expected in [0x41u64, 0xF600u64] {
            let (unit, n) = read_varint(&bytes[at..]).unwrap();
            assert_eq!(unit, expected);
            at += n;
        }

        let mut host = compressed_host(64);
        host.write_latin1(b"\xE9t\xE9");
        let bytes = live(&host);
        assert_eq!(bytes[0], StringTag::Latin1.as_u8());
        let (len, consumed) = read_varint(&bytes[1..]).unwrap();
        assert_eq!(len, 3);
        assert_eq!(&bytes[1 + consumed..], b"\xE9t\xE9");
    }

    #[test]
    fn taggable_resolution() {
        struct Entity(TraceId);
        impl flightrec_types::Taggable for Entity {
            fn trace_id(&self) -> TraceId {
                self.0
            }
        }

        let mut host = compressed_host(64);
        let entity = Entity(TraceId::new(9).unwrap());
        host.write_taggable(&entity);
        host.write_taggable_opt::<Entity>(None);
        let bytes = live(&host);
        assert_eq!(read_varint(bytes), Some((9, 1)));
        assert_eq!(read_varint(&bytes[1..]), Some((0, 1)));
    }

    #[test]
    fn padded_write_at_cursor_fills_the_declared_slot() {
        let mut host = compressed_host(64);
        host.write_padded(300, 4);
        assert_eq!(host.current_offset(), 4, "padded form is exactly the slot");
        assert_eq!(read_varint(live(&host)), Some((300, 4)));
        let sink = host.into_sink();
        assert_eq!(sink.position(), 4);

        let mut host = WriterHost::new(
            GrowableBuffer::new(64),
            WriterOptions {
                encoding: IntegerEncoding::BigEndian,
            },
        );
        host.write_padded(300, 4);
        assert_eq!(host.current_offset(), 4);
        assert_eq!(read_be(live(&host), 4), Some((300, 4)));
    }

    #[test]
    fn padded_backfill_preserves_following_bytes() {
        let mut host = compressed_host(64);
        let slot = host.reserve(4).expect("reserve fits");
        host.write_str("payload");
        let tail_before = live(&host)[4..].to_vec();

        host.write_padded_at(slot, 1234, 4);
        let bytes = live(&host);
        assert_eq!(read_varint(&bytes[..4]), Some((1234, 4)));
        assert_eq!(&bytes[4..], &tail_before[..]);
    }

    #[test]
    fn exhaustion_invalidates_and_silences_writes() {
        let mut host = compressed_host(4);
        host.write_u32(1);
        assert!(host.is_valid());
        host.write_bytes(&[0u8; 16]);
        assert!(!host.is_valid());

        let offset = host.current_offset();
        host.write_u64(u64::MAX);
        host.write_str("ignored");
        assert_eq!(host.current_offset(), offset, "writes must be no-ops");
        assert!(host.reserve(1).is_none());
    }

    #[test]
    fn fixed_fields_are_big_endian_under_compressed_codec() {
        let mut host = compressed_host(64);
        host.write_ticks(flightrec_types::Ticks::from_raw(0x0102_0304));
        assert_eq!(
            live(&host),
            &[0, 0, 0, 0, 0x01, 0x02, 0x03, 0x04]
        );
    }
}
