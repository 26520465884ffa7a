//! This module contains the pure, stateless kernels for performing LEB128
//! (Little-Endian Base 128) variable-length integer encoding and decoding.
//!
//! STRF uses LEB128 for every integer stream (after zig-zag for signed data),
//! for string lengths and for dictionary indices. It is fully panic-free.

use num_traits::{PrimInt, Unsigned};

use crate::error::StripeError;

//==================================================================================
// 1. Single Values
//==================================================================================

/// Appends the LEB128 form of `value` to `buffer`.
pub fn encode_one<T>(value: T, buffer: &mut Vec<u8>) -> Result<(), StripeError>
where
    T: PrimInt + Unsigned,
{
    let low_bits = T::from(0x7F)
        .ok_or_else(|| StripeError::Leb128DecodeError("type cannot hold a 7-bit group".into()))?;
    let mut rest = value;
    loop {
        let group = (rest & low_bits)
            .to_u8()
            .ok_or_else(|| StripeError::Leb128DecodeError("7-bit group does not fit u8".into()))?;
        rest = rest >> 7;
        if rest.is_zero() {
            buffer.push(group);
            return Ok(());
        }
        buffer.push(group | 0x80);
    }
}

/// Decodes one value from the front of `input` and advances it past the
/// bytes consumed.
pub fn decode_one<T>(input: &mut &[u8]) -> Result<T, StripeError>
where
    T: PrimInt + Unsigned,
{
    let width = std::mem::size_of::<T>() * 8;
    let bytes: &[u8] = *input;
    let mut value = T::zero();
    for (i, &byte) in bytes.iter().enumerate() {
        let shift = i * 7;
        if shift >= width {
            break;
        }
        let group = T::from(byte & 0x7F)
            .ok_or_else(|| StripeError::Leb128DecodeError("7-bit group does not fit type".into()))?;
        value = value | (group << shift);
        if byte & 0x80 == 0 {
            // The final group may not carry bits past the type's width.
            if shift + 7 > width && (byte & 0x7F) >> (width - shift) != 0 {
                break;
            }
            *input = &bytes[i + 1..];
            return Ok(value);
        }
    }
    if bytes.len() * 7 >= width {
        Err(StripeError::Leb128DecodeError(format!(
            "Integer overflow: varint exceeds {} bits",
            width
        )))
    } else {
        Err(StripeError::Leb128DecodeError("Unexpected end of buffer".into()))
    }
}

//==================================================================================
// 2. Streams
//==================================================================================

/// Appends every value of `input_slice` to `output_buf`.
pub fn encode<T>(input_slice: &[T], output_buf: &mut Vec<u8>) -> Result<(), StripeError>
where
    T: PrimInt + Unsigned,
{
    input_slice
        .iter()
        .try_for_each(|&value| encode_one(value, output_buf))
}

/// Decodes exactly `num_values` values; the whole input must be consumed.
pub fn decode_all<T>(input_bytes: &[u8], num_values: usize) -> Result<Vec<T>, StripeError>
where
    T: PrimInt + Unsigned,
{
    // Every varint takes at least one byte.
    if num_values > input_bytes.len() {
        return Err(StripeError::Leb128DecodeError(format!(
            "Stream of {} bytes cannot hold {} values",
            input_bytes.len(),
            num_values
        )));
    }

    let mut rest = input_bytes;
    let values = (0..num_values)
        .map(|_| decode_one::<T>(&mut rest))
        .collect::<Result<Vec<_>, _>>()?;
    if !rest.is_empty() {
        return Err(StripeError::Leb128DecodeError(format!(
            "{} trailing bytes after {} values",
            rest.len(),
            num_values
        )));
    }
    Ok(values)
}

/// Decodes values until the input is exhausted. Used where the count is
/// implied by the stream itself, such as dictionary lengths.
pub fn decode_to_end<T>(input_bytes: &[u8]) -> Result<Vec<T>, StripeError>
where
    T: PrimInt + Unsigned,
{
    let mut rest = input_bytes;
    let mut values = Vec::new();
    while !rest.is_empty() {
        values.push(decode_one::<T>(&mut rest)?);
    }
    Ok(values)
}

//==================================================================================
// 3. Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leb128_roundtrip_u32() {
        let original: Vec<u32> = vec![0, 127, 128, 1000, u32::MAX];
        let mut encoded_bytes = Vec::new();
        encode(&original, &mut encoded_bytes).unwrap();
        let decoded = decode_all::<u32>(&encoded_bytes, original.len()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_known_encoding() {
        let mut buf = Vec::new();
        encode_one(624485u64, &mut buf).unwrap();
        assert_eq!(buf, vec![0xE5, 0x8E, 0x26]);
    }

    #[test]
    fn test_decode_truncated_buffer() {
        let result = decode_all::<u64>(&[0xE5, 0x8E], 1);
        match result {
            Err(StripeError::Leb128DecodeError(msg)) => {
                assert!(msg.contains("Unexpected end of buffer"))
            }
            other => panic!("Expected Leb128DecodeError, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_overflow_error() {
        // This represents a value larger than u64::MAX
        let encoded_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        let result = decode_all::<u64>(&encoded_bytes, 1);
        if let Err(StripeError::Leb128DecodeError(msg)) = result {
            assert!(msg.contains("overflow"));
        } else {
            panic!("Expected Leb128DecodeError for overflow");
        }
    }

    #[test]
    fn test_value_count_larger_than_input_is_rejected() {
        assert!(decode_all::<u64>(&[0x01], 5).is_err());
    }

    #[test]
    fn test_decode_to_end() {
        assert_eq!(decode_to_end::<u64>(&[0x03, 0xE5, 0x8E, 0x26]).unwrap(), vec![3, 624485]);
        assert!(decode_to_end::<u64>(&[]).unwrap().is_empty());
        assert!(decode_to_end::<u64>(&[0x80]).is_err());
    }
}
