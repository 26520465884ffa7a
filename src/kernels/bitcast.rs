//! This module contains the pure, stateless kernel for reinterpreting raw
//! little-endian byte runs as typed values.
//!
//! STRF stores float columns as their raw little-endian bit patterns. Column
//! chunk payloads are plain `Vec<u8>` and are not guaranteed to be aligned for
//! `f64`, so the decoder falls back to unaligned reads when needed. This
//! module relies on `bytemuck` for safety.

use crate::error::StripeError;
use bytemuck::{Pod, PodCastError};

//==================================================================================
// 1. Public API
//==================================================================================

/// Reinterprets `input_bytes` as exactly `num_values` values of `T`.
pub fn decode<T>(input_bytes: &[u8], num_values: usize) -> Result<Vec<T>, StripeError>
where
    T: Pod,
{
    let width = std::mem::size_of::<T>();
    let expected_len = num_values.checked_mul(width).ok_or_else(|| {
        StripeError::ChunkFormatError(format!(
            "{} values of {} overflow the addressable size",
            num_values,
            std::any::type_name::<T>()
        ))
    })?;
    if input_bytes.len() != expected_len {
        return Err(StripeError::ChunkFormatError(format!(
            "Expected {} values of {} ({} bytes), got {} bytes",
            num_values,
            std::any::type_name::<T>(),
            expected_len,
            input_bytes.len()
        )));
    }

    match bytemuck::try_cast_slice::<u8, T>(input_bytes) {
        Ok(typed) => Ok(typed.to_vec()),
        Err(PodCastError::TargetAlignmentGreaterAndInputNotAligned) => Ok(input_bytes
            .chunks_exact(width)
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect()),
        Err(e) => Err(e.into()),
    }
}

/// Writes typed values as their raw byte representation.
pub fn encode<T>(values: &[T]) -> Vec<u8>
where
    T: Pod,
{
    bytemuck::cast_slice::<T, u8>(values).to_vec()
}

//==================================================================================
// 2. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitcast_f64_roundtrip() {
        let original: Vec<f64> = vec![100.0, -100.0, std::f64::consts::E, f64::NAN];
        let bytes = encode(&original);
        let decoded = decode::<f64>(&bytes, original.len()).unwrap();
        assert_eq!(decoded[..3], original[..3]);
        assert!(decoded[3].is_nan());
    }

    #[test]
    fn test_bitcast_handles_unaligned_input() {
        let original: Vec<f64> = vec![1.5, -2.25];
        let mut padded = vec![0u8];
        padded.extend_from_slice(&encode(&original));
        let decoded = decode::<f64>(&padded[1..], 2).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_bitcast_size_mismatch_error() {
        let bytes = encode(&[1.0f32]);
        let result = decode::<f32>(&bytes, 2);
        assert!(matches!(result, Err(StripeError::ChunkFormatError(_))));
    }

    #[test]
    fn test_bitcast_value_count_overflow_error() {
        let bytes = encode(&[1.0f64]);
        let result = decode::<f64>(&bytes, usize::MAX / 4);
        assert!(matches!(result, Err(StripeError::ChunkFormatError(_))));
    }
}
