//! This module serves as the public API for the collection of pure, stateless
//! stream kernels used to decode (and, for fixtures, encode) STRF column chunks.
//!
//! Each STRF stream is produced by a short, fixed chain of these kernels:
//! - varint streams: zig-zag -> LEB128 -> (optional) zstd
//! - float streams:  little-endian bytes -> (optional) zstd
//! - bitmaps:        LSB-first bit packing -> (optional) zstd

use crate::error::StripeError;

//==================================================================================
// 1. Module Declarations
//==================================================================================

/// Layer 0: Type Reinterpretation
pub mod bitcast;

/// Layer 1: Bit-Width Reduction
pub mod leb128;
pub mod zigzag;

/// Final Stage: Entropy Coding
pub mod zstd;

//==================================================================================
// 2. Composite Helpers
//==================================================================================

/// Decodes `num_values` zig-zag LEB128 varints into signed 64-bit integers.
pub fn decode_signed_varints(input_bytes: &[u8], num_values: usize) -> Result<Vec<i64>, StripeError> {
    let unsigned = leb128::decode_all::<u64>(input_bytes, num_values)?;
    Ok(unsigned.into_iter().map(zigzag::decode_val::<i64>).collect())
}

/// Decodes `num_values` plain LEB128 varints (lengths, dictionary indices).
pub fn decode_unsigned_varints(
    input_bytes: &[u8],
    num_values: usize,
) -> Result<Vec<u64>, StripeError> {
    leb128::decode_all::<u64>(input_bytes, num_values)
}

/// Encodes signed integers as zig-zag LEB128 varints.
pub fn encode_signed_varints(values: &[i64]) -> Result<Vec<u8>, StripeError> {
    let zigzagged: Vec<u64> = values.iter().map(|&v| zigzag::encode_val(v)).collect();
    let mut out = Vec::with_capacity(values.len());
    leb128::encode(&zigzagged, &mut out)?;
    Ok(out)
}

/// Encodes unsigned integers as plain LEB128 varints.
pub fn encode_unsigned_varints(values: &[u64]) -> Result<Vec<u8>, StripeError> {
    let mut out = Vec::with_capacity(values.len());
    leb128::encode(values, &mut out)?;
    Ok(out)
}
