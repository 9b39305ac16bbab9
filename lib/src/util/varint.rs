//! ULEB128 and zig-zag SLEB128 decoding.

use crate::{
    error::{DecodeError, DecodeResult},
    util::cursor::ByteCursor,
};

/// Continuation bytes stop being accepted once the shift reaches this many bits.
pub const MAX_SHIFT: u32 = 70;

pub fn decode_uleb128(cursor: &mut ByteCursor) -> DecodeResult<u64> {
    let start = cursor.position();
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = cursor.read_u8()?;
        if shift < u64::BITS {
            result |= u64::from(byte & 0x7F) << shift;
        }
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= MAX_SHIFT {
            return Err(DecodeError::VarintOverflow { offset: start });
        }
    }
}

pub fn decode_sleb128(cursor: &mut ByteCursor) -> DecodeResult<i64> {
    decode_uleb128(cursor).map(zigzag_decode)
}

#[inline]
pub fn zigzag_decode(u: u64) -> i64 { ((u >> 1) as i64) ^ -((u & 1) as i64) }

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn encode_uleb128(mut value: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    pub(crate) fn zigzag_encode(n: i64) -> u64 { ((n << 1) ^ (n >> 63)) as u64 }

    pub(crate) fn encode_sleb128(n: i64, out: &mut Vec<u8>) {
        encode_uleb128(zigzag_encode(n), out)
    }

    fn reference_decode(bytes: &[u8]) -> u128 {
        let mut acc = 0u128;
        for (i, b) in bytes.iter().enumerate() {
            acc |= u128::from(b & 0x7F) << (7 * i);
            if b & 0x80 == 0 {
                break;
            }
        }
        acc
    }

    #[test]
    fn uleb128_known_values() {
        let cases: [(&[u8], u64); 5] = [
            (&[0x00], 0),
            (&[0x7F], 127),
            (&[0x80, 0x01], 128),
            (&[0xE5, 0x8E, 0x26], 624485),
            (&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u64::MAX),
        ];
        for (bytes, expected) in cases {
            let mut cursor = ByteCursor::new(bytes);
            assert_eq!(decode_uleb128(&mut cursor).unwrap(), expected);
            assert!(cursor.is_at_end());
        }
    }

    #[test]
    fn uleb128_matches_reference_accumulation() {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        for _ in 0..2000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let value = state >> (state % 64);
            let mut bytes = Vec::new();
            encode_uleb128(value, &mut bytes);
            let mut cursor = ByteCursor::new(&bytes);
            let decoded = decode_uleb128(&mut cursor).unwrap();
            assert_eq!(u128::from(decoded), reference_decode(&bytes));
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn uleb128_stops_at_terminator() {
        let bytes = [0x81, 0x01, 0x05];
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(decode_uleb128(&mut cursor).unwrap(), 129);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn uleb128_rejects_runaway_continuation() {
        let bytes = [0xFFu8; 16];
        let mut cursor = ByteCursor::new(&bytes);
        let err = decode_uleb128(&mut cursor).unwrap_err();
        assert!(matches!(err, DecodeError::VarintOverflow { offset: 0 }));
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn uleb128_truncated_is_eof() {
        let bytes = [0x80, 0x80];
        let mut cursor = ByteCursor::new(&bytes);
        assert!(matches!(
            decode_uleb128(&mut cursor),
            Err(DecodeError::UnexpectedEof { offset: 2 })
        ));
    }

    #[test]
    fn sleb128_round_trips_signed_range() {
        let mut samples = vec![0i64, 1, -1, 2, -2, 63, -64, 64, i64::MAX, i64::MIN, i64::MIN + 1];
        let mut state = 1u64;
        for _ in 0..2000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            samples.push(state as i64 >> (state % 63));
        }
        for n in samples {
            let mut bytes = Vec::new();
            encode_sleb128(n, &mut bytes);
            let mut cursor = ByteCursor::new(&bytes);
            assert_eq!(decode_sleb128(&mut cursor).unwrap(), n);
        }
    }

    #[test]
    fn zigzag_small_values() {
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_decode(u64::MAX), i64::MIN);
    }
}
