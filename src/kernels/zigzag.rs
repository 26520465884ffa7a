//! This module contains the pure, stateless kernels for performing Zig-zag
//! encoding and decoding.
//!
//! Zig-zag is a lossless, bitwise mapping of signed integers to unsigned
//! integers so that small negative values become small varints.

use num_traits::{AsPrimitive, One};

use crate::traits::SignedWidth;

//==================================================================================
// 1. Generic Core Logic
//==================================================================================

/// Maps a signed value onto its zig-zag unsigned form: 0, -1, 1, -2 -> 0, 1, 2, 3.
pub fn encode_val<S>(n: S) -> S::Unsigned
where
    S: SignedWidth + AsPrimitive<S::Unsigned>,
{
    // The right shift on a signed PrimInt is arithmetic.
    ((n << 1) ^ (n >> (S::BITS - 1))).as_()
}

/// Inverts [`encode_val`].
pub fn decode_val<S>(n: S::Unsigned) -> S
where
    S: SignedWidth,
    S::Unsigned: AsPrimitive<S>,
{
    let half: S = (n >> 1).as_();
    let sign: S = (n & S::Unsigned::one()).as_();
    half ^ -sign
}

//==================================================================================
// 2. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag_known_values() {
        assert_eq!(encode_val(0i64), 0u64);
        assert_eq!(encode_val(-1i64), 1u64);
        assert_eq!(encode_val(1i64), 2u64);
        assert_eq!(encode_val(-2i32), 3u32);
        assert_eq!(encode_val(i8::MIN), u8::MAX);
    }

    #[test]
    fn test_zigzag_decode_inverts_encode() {
        for v in [i64::MIN, -300, -1, 0, 1, 300, i64::MAX] {
            assert_eq!(decode_val::<i64>(encode_val(v)), v);
        }
    }
}
