//! Variable-length integer encoding for the packed tier.
//!
//! Unsigned values use 7 data bits per byte with the high bit as a
//! continuation flag. Signed values are ZigZag-mapped first so that small
//! negative deltas stay short.

use bytes::{Buf, BufMut};

/// Longest encoding of a `u64`.
pub(crate) const MAX_VARINT_LEN: usize = 10;

/// Encodes an unsigned integer.
pub(crate) fn put_u64(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Encodes a signed integer using ZigZag.
pub(crate) fn put_i64(buf: &mut impl BufMut, value: i64) {
    put_u64(buf, ((value << 1) ^ (value >> 63)) as u64);
}

/// Decodes an unsigned integer.
///
/// Returns `None` if the buffer ends mid-value or the value overflows.
pub(crate) fn get_u64(buf: &mut impl Buf) -> Option<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return None;
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// Decodes a ZigZag-encoded signed integer.
pub(crate) fn get_i64(buf: &mut impl Buf) -> Option<i64> {
    let raw = get_u64(buf)?;
    Some(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn small_values_take_one_byte() {
        let mut buf = BytesMut::new();
        put_u64(&mut buf, 0);
        put_u64(&mut buf, 127);
        assert_eq!(buf.len(), 2);

        let mut cursor = buf.as_ref();
        assert_eq!(get_u64(&mut cursor), Some(0));
        assert_eq!(get_u64(&mut cursor), Some(127));
        assert!(cursor.is_empty());
    }

    #[test]
    fn boundary_values() {
        for value in [128u64, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            let mut buf = BytesMut::new();
            put_u64(&mut buf, value);

            let mut cursor = buf.as_ref();
            assert_eq!(get_u64(&mut cursor), Some(value));
        }
    }

    #[test]
    fn zigzag_keeps_small_negatives_short() {
        let mut buf = BytesMut::new();
        put_i64(&mut buf, -1);
        assert_eq!(buf.len(), 1);

        for value in [-1i64, 1, -64, 63, i64::MIN, i64::MAX] {
            let mut buf = BytesMut::new();
            put_i64(&mut buf, value);
            let mut cursor = buf.as_ref();
            assert_eq!(get_i64(&mut cursor), Some(value));
        }
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut cursor: &[u8] = &[0x80, 0x80];
        assert_eq!(get_u64(&mut cursor), None);

        let mut empty: &[u8] = &[];
        assert_eq!(get_u64(&mut empty), None);
    }
}
