//! Binary encoder primitives for the recorder wire format.
//!
//! Two stateless integer codecs, each with a padded fixed-size variant:
//!
//! - **Big-endian**: exactly `width` bytes, network byte order. The padded
//!   form is identical (the width is already fixed).
//! - **Varint ("compressed integer")**: base-128, least-significant group
//!   first, continuation bit = MSB of each emitted byte. A value needing `k`
//!   groups of 7 bits emits `k` bytes, the last without the continuation bit.
//!   At most 9 bytes are ever emitted; the 9th carries the remaining 8 bits
//!   unflagged. The padded form emits exactly the slot's declared byte count
//!   (continuation bit on all but the last byte), so a previously reserved
//!   slot can be backfilled without shifting subsequent bytes.
//!
//! Encoding and padded-encoding of the same value decode to the same integer;
//! only the byte count differs. Negative values are cast to the unsigned
//! representation of equal bit width before encoding.

use flightrec_types::IntegerEncoding;

/// Longest possible varint encoding of a u64.
pub const MAX_VARINT_LEN: usize = 9;

/// Number of bytes needed to varint-encode `value`.
#[must_use]
pub const fn varint_len(value: u64) -> usize {
    if value < 1 << 7 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 21 {
        3
    } else if value < 1 << 28 {
        4
    } else if value < 1 << 35 {
        5
    } else if value < 1 << 42 {
        6
    } else if value < 1 << 49 {
        7
    } else if value < 1 << 56 {
        8
    } else {
        9
    }
}

/// Write a varint, returning the number of bytes written.
///
/// The buffer must have at least [`MAX_VARINT_LEN`] bytes available.
#[allow(clippy::cast_possible_truncation)]
pub fn write_varint(buf: &mut [u8], value: u64) -> usize {
    let mut v = value;
    let mut i = 0;
    while v >= 0x80 && i < 8 {
        buf[i] = (v as u8 & 0x7F) | 0x80;
        v >>= 7;
        i += 1;
    }
    if i == 8 {
        // 9th byte carries the remaining 8 bits, no continuation flag.
        buf[8] = v as u8;
        9
    } else {
        buf[i] = v as u8;
        i + 1
    }
}

/// Read a varint, returning the value and the number of bytes consumed.
///
/// Returns `None` if the buffer ends before a terminating byte.
pub fn read_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate().take(8) {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    if buf.len() > 8 {
        value |= u64::from(buf[8]) << 56;
        Some((value, 9))
    } else {
        None
    }
}

/// Largest value representable in a padded varint slot of `width` bytes.
///
/// All but the last byte carry 7 bits; a 9-byte slot's last byte carries 8.
#[must_use]
pub const fn padded_varint_max(width: usize) -> u64 {
    if width >= MAX_VARINT_LEN {
        u64::MAX
    } else {
        (1u64 << (7 * width)) - 1
    }
}

/// Write a varint padded to exactly `width` bytes.
///
/// All but the last byte have the continuation bit set, so a decoder stops on
/// the final byte regardless of the encoded magnitude. `value` must fit in
/// [`padded_varint_max(width)`](padded_varint_max); excess high bits are
/// dropped (checked in debug builds).
#[allow(clippy::cast_possible_truncation)]
pub fn write_varint_padded(buf: &mut [u8], value: u64, width: usize) -> usize {
    debug_assert!(width >= 1 && width <= MAX_VARINT_LEN);
    debug_assert!(
        value <= padded_varint_max(width),
        "value {value} does not fit a {width}-byte padded slot"
    );
    let mut v = value;
    for slot in buf.iter_mut().take(width - 1) {
        *slot = (v as u8 & 0x7F) | 0x80;
        v >>= 7;
    }
    // Final byte: 7 payload bits, or all 8 in the 9-byte form.
    buf[width - 1] = if width == MAX_VARINT_LEN {
        v as u8
    } else {
        v as u8 & 0x7F
    };
    width
}

/// Write `value` as exactly `width` big-endian bytes (1, 2, 4, or 8).
#[allow(clippy::cast_possible_truncation)]
pub fn write_be(buf: &mut [u8], value: u64, width: usize) -> usize {
    debug_assert!(matches!(width, 1 | 2 | 4 | 8));
    let bytes = value.to_be_bytes();
    buf[..width].copy_from_slice(&bytes[8 - width..]);
    width
}

/// Read `width` big-endian bytes, returning the value and bytes consumed.
pub fn read_be(buf: &[u8], width: usize) -> Option<(u64, usize)> {
    debug_assert!(matches!(width, 1 | 2 | 4 | 8));
    if buf.len() < width {
        return None;
    }
    let mut value: u64 = 0;
    for &byte in &buf[..width] {
        value = (value << 8) | u64::from(byte);
    }
    Some((value, width))
}

/// Integer codec selected once per writer instance.
///
/// Dispatches between the varint and big-endian primitives; `width` is the
/// declared byte width of the value being written (1, 2, 4, or 8), which the
/// big-endian codec emits verbatim and the varint codec uses only for the
/// padded form's slot size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    encoding: IntegerEncoding,
}

impl Encoder {
    /// Create an encoder for the given integer encoding.
    #[must_use]
    pub const fn new(encoding: IntegerEncoding) -> Self {
        Self { encoding }
    }

    /// The encoding this encoder dispatches to.
    #[must_use]
    pub const fn encoding(&self) -> IntegerEncoding {
        self.encoding
    }

    /// Encode `value` at the buffer start, returning bytes written.
    pub fn encode(&self, buf: &mut [u8], value: u64, width: usize) -> usize {
        match self.encoding {
            IntegerEncoding::Compressed => write_varint(buf, value),
            IntegerEncoding::BigEndian => write_be(buf, value, width),
        }
    }

    /// Encode `value` using the codec's fixed maximal form for a `width`-byte
    /// slot, returning bytes written.
    ///
    /// Required wherever a later backfill must overwrite a previously
    /// reserved slot without shifting subsequent bytes.
    pub fn encode_padded(&self, buf: &mut [u8], value: u64, width: usize) -> usize {
        match self.encoding {
            IntegerEncoding::Compressed => write_varint_padded(buf, value, width),
            IntegerEncoding::BigEndian => write_be(buf, value, width),
        }
    }

    /// Byte count of the padded form for a `width`-byte slot.
    #[must_use]
    pub const fn padded_len(&self, width: usize) -> usize {
        // Both codecs pad to exactly the slot width.
        width
    }

    /// Worst-case byte count of the plain form for a `width`-byte value.
    #[must_use]
    pub const fn max_encoded_len(&self, width: usize) -> usize {
        match self.encoding {
            IntegerEncoding::Compressed => {
                if width >= 8 {
                    MAX_VARINT_LEN
                } else {
                    width * 8 / 7 + 1
                }
            }
            IntegerEncoding::BigEndian => width,
        }
    }

    /// Decode one value previously written by [`encode`](Self::encode) or
    /// [`encode_padded`](Self::encode_padded) (big-endian decode needs the
    /// original slot width). Used by tests and framing assertions.
    pub fn decode(&self, buf: &[u8], width: usize) -> Option<(u64, usize)> {
        match self.encoding {
            IntegerEncoding::Compressed => read_varint(buf),
            IntegerEncoding::BigEndian => read_be(buf, width),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Byte-length boundary values: (min_value, max_value, expected_bytes).
    const BYTE_BOUNDARIES: [(u64, u64, usize); 9] = [
        (0, 0x7F, 1),
        (0x80, 0x3FFF, 2),
        (0x4000, 0x001F_FFFF, 3),
        (0x0020_0000, 0x0FFF_FFFF, 4),
        (0x1000_0000, 0x07_FFFF_FFFF, 5),
        (0x08_0000_0000, 0x03FF_FFFF_FFFF, 6),
        (0x0400_0000_0000, 0x01_FFFF_FFFF_FFFF, 7),
        (0x02_0000_0000_0000, 0xFF_FFFF_FFFF_FFFF, 8),
        (0x0100_0000_0000_0000, u64::MAX, 9),
    ];

    #[test]
    fn varint_len_matches_boundaries() {
        for (lo, hi, len) in BYTE_BOUNDARIES {
            assert_eq!(varint_len(lo), len, "low boundary {lo:#x}");
            assert_eq!(varint_len(hi), len, "high boundary {hi:#x}");
        }
    }

    #[test]
    fn varint_roundtrip_boundaries() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for (lo, hi, len) in BYTE_BOUNDARIES {
            for value in [lo, hi] {
                let written = write_varint(&mut buf, value);
                assert_eq!(written, len);
                assert_eq!(read_varint(&buf), Some((value, len)));
            }
        }
    }

    #[test]
    fn varint_is_least_significant_group_first() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let written = write_varint(&mut buf, 0x81);
        assert_eq!(written, 2);
        assert_eq!(buf[0], 0x81); // low 7 bits + continuation
        assert_eq!(buf[1], 0x01); // high bit, no continuation
    }

    #[test]
    fn ninth_byte_carries_eight_unflagged_bits() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let written = write_varint(&mut buf, u64::MAX);
        assert_eq!(written, 9);
        assert!(buf[..8].iter().all(|b| b & 0x80 != 0));
        assert_eq!(buf[8], 0xFF);
        assert_eq!(read_varint(&buf), Some((u64::MAX, 9)));
    }

    #[test]
    fn truncated_varint_is_rejected() {
        assert!(read_varint(&[]).is_none());
        assert!(read_varint(&[0x80]).is_none());
        assert!(read_varint(&[0x80; 8]).is_none());
    }

    #[test]
    fn padded_varint_fills_slot_exactly() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for width in 1..=MAX_VARINT_LEN {
            let value = padded_varint_max(width).min(12_345);
            let written = write_varint_padded(&mut buf, value, width);
            assert_eq!(written, width);
            assert!(buf[..width - 1].iter().all(|b| b & 0x80 != 0));
            if width < MAX_VARINT_LEN {
                assert_eq!(buf[width - 1] & 0x80, 0);
            }
            assert_eq!(read_varint(&buf[..width]), Some((value, width)));
        }
    }

    #[test]
    fn padded_slot_backfill_does_not_shift() {
        // Write a placeholder, then overwrite the same bytes with the true
        // value; length must not change and the decode must see the new value.
        let mut buf = [0u8; 16];
        let reserved = write_varint_padded(&mut buf, 0, 4);
        buf[4] = 0xAB; // sentinel directly after the slot
        let patched = write_varint_padded(&mut buf, 0x0ABC_DEF, 4);
        assert_eq!(reserved, patched);
        assert_eq!(read_varint(&buf[..4]), Some((0x0ABC_DEF, 4)));
        assert_eq!(buf[4], 0xAB);
    }

    #[test]
    fn padded_varint_max_values() {
        assert_eq!(padded_varint_max(1), 127);
        assert_eq!(padded_varint_max(4), (1 << 28) - 1);
        assert_eq!(padded_varint_max(8), (1 << 56) - 1);
        assert_eq!(padded_varint_max(9), u64::MAX);
    }

    #[test]
    fn big_endian_widths() {
        let mut buf = [0u8; 8];
        assert_eq!(write_be(&mut buf, 0x1234, 2), 2);
        assert_eq!(&buf[..2], &[0x12, 0x34]);
        assert_eq!(read_be(&buf, 2), Some((0x1234, 2)));

        assert_eq!(write_be(&mut buf, 0x0102_0304_0506_0708, 8), 8);
        assert_eq!(
            read_be(&buf, 8),
            Some((0x0102_0304_0506_0708, 8))
        );
    }

    #[test]
    fn negative_values_encode_at_declared_width() {
        // Callers cast to the unsigned representation of equal bit width;
        // -1i32 becomes 0xFFFF_FFFF, not a sign-extended u64.
        let as_u32 = u64::from((-1i32) as u32);
        let mut buf = [0u8; MAX_VARINT_LEN];
        let written = write_varint(&mut buf, as_u32);
        assert_eq!(written, 5);
        assert_eq!(read_varint(&buf), Some((as_u32, 5)));
    }

    #[test]
    fn encoder_dispatch() {
        use flightrec_types::IntegerEncoding;

        let mut buf = [0u8; MAX_VARINT_LEN];
        let compressed = Encoder::new(IntegerEncoding::Compressed);
        let be = Encoder::new(IntegerEncoding::BigEndian);

        assert_eq!(compressed.encode(&mut buf, 300, 4), 2);
        assert_eq!(compressed.decode(&buf, 4), Some((300, 2)));
        assert_eq!(compressed.encode_padded(&mut buf, 300, 4), 4);
        assert_eq!(compressed.decode(&buf, 4), Some((300, 4)));

        assert_eq!(be.encode(&mut buf, 300, 4), 4);
        assert_eq!(be.encode_padded(&mut buf, 300, 4), 4);
        assert_eq!(be.decode(&buf, 4), Some((300, 4)));

        assert_eq!(compressed.max_encoded_len(1), 2);
        assert_eq!(compressed.max_encoded_len(2), 3);
        assert_eq!(compressed.max_encoded_len(4), 5);
        assert_eq!(compressed.max_encoded_len(8), MAX_VARINT_LEN);
        assert_eq!(be.max_encoded_len(8), 8);
    }

    proptest! {
        #[test]
        fn prop_varint_roundtrip(value in any::<u64>()) {
            let mut buf = [0u8; MAX_VARINT_LEN];
            let written = write_varint(&mut buf, value);
            prop_assert_eq!(written, varint_len(value));
            prop_assert_eq!(read_varint(&buf[..written]), Some((value, written)));
        }

        #[test]
        fn prop_padded_and_plain_decode_identically(value in any::<u64>()) {
            let mut plain = [0u8; MAX_VARINT_LEN];
            let mut padded = [0u8; MAX_VARINT_LEN];
            let n = write_varint(&mut plain, value);
            write_varint_padded(&mut padded, value, MAX_VARINT_LEN);
            prop_assert_eq!(read_varint(&plain[..n]).unwrap().0, value);
            prop_assert_eq!(read_varint(&padded).unwrap().0, value);
        }

        #[test]
        fn prop_padded_roundtrip_in_range(width in 1usize..=9, raw in any::<u64>()) {
            let value = raw & padded_varint_max(width);
            let mut buf = [0u8; MAX_VARINT_LEN];
            let written = write_varint_padded(&mut buf, value, width);
            prop_assert_eq!(written, width);
            prop_assert_eq!(read_varint(&buf[..width]), Some((value, width)));
        }

        #[test]
        fn prop_be_roundtrip(value in any::<u64>(), width_sel in 0usize..4) {
            let width = [1usize, 2, 4, 8][width_sel];
            let masked = if width == 8 { value } else { value & ((1 << (8 * width)) - 1) };
            let mut buf = [0u8; 8];
            let written = write_be(&mut buf, masked, width);
            prop_assert_eq!(written, width);
            prop_assert_eq!(read_be(&buf, width), Some((masked, width)));
        }
    }
}
