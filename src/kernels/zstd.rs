//! This module contains the pure, stateless kernels for Zstandard stream frames.
//!
//! A compressed STRF stream is `uncompressed_len:u64` followed by one zstd
//! frame. This module is a safe, panic-free wrapper around the `zstd` crate.

use crate::error::StripeError;

/// A reasonable limit to prevent OOM from a malformed size header. (1GB)
const MAX_UNCOMPRESSED_LEN: usize = 1024 * 1024 * 1024;

//==================================================================================
// 1. Public API
//==================================================================================

/// Compresses `input_bytes` and prepends the uncompressed size.
pub fn encode(input_bytes: &[u8], level: i32) -> Result<Vec<u8>, StripeError> {
    if input_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut output_buf = Vec::with_capacity(input_bytes.len());
    let uncompressed_len: u64 = input_bytes.len() as u64;
    output_buf.extend_from_slice(&uncompressed_len.to_le_bytes());

    let mut encoder = zstd::stream::Encoder::new(&mut output_buf, level)
        .map_err(|e| StripeError::ZstdError(e.to_string()))?;
    std::io::Write::write_all(&mut encoder, input_bytes)
        .map_err(|e| StripeError::ZstdError(e.to_string()))?;
    // `finish` is essential to finalize the Zstd frame.
    encoder
        .finish()
        .map_err(|e| StripeError::ZstdError(e.to_string()))?;

    Ok(output_buf)
}

/// Reads the size header and decompresses the frame that follows it.
pub fn decode(input_bytes: &[u8]) -> Result<Vec<u8>, StripeError> {
    if input_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let (len_bytes, compressed_data) = input_bytes
        .split_first_chunk::<8>()
        .ok_or_else(|| {
            StripeError::ZstdError("Input stream too short to contain size header.".to_string())
        })?;
    let uncompressed_len = u64::from_le_bytes(*len_bytes) as usize;
    if uncompressed_len > MAX_UNCOMPRESSED_LEN {
        return Err(StripeError::ZstdError(format!(
            "Declared uncompressed size {} exceeds limit {}",
            uncompressed_len, MAX_UNCOMPRESSED_LEN
        )));
    }

    let mut decompressed_data = Vec::with_capacity(uncompressed_len);
    zstd::stream::copy_decode(compressed_data, &mut decompressed_data)
        .map_err(|e| StripeError::ZstdError(e.to_string()))?;

    if decompressed_data.len() != uncompressed_len {
        return Err(StripeError::ZstdError(format!(
            "Decompressed size does not match header. Expected {}, got {}.",
            uncompressed_len,
            decompressed_data.len()
        )));
    }

    Ok(decompressed_data)
}

//==================================================================================
// 2. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip_simple_text() {
        let original_bytes =
            b"hello world, this is a test of zstd compression. hello world, this is a test."
                .to_vec();
        let compressed_bytes = encode(&original_bytes, 3).unwrap();
        assert_eq!(&compressed_bytes[..8], &(original_bytes.len() as u64).to_le_bytes());
        assert_eq!(decode(&compressed_bytes).unwrap(), original_bytes);
    }

    #[test]
    fn test_zstd_empty_stream_stays_empty() {
        assert!(encode(&[], 3).unwrap().is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_zstd_decompress_invalid_data() {
        let result = decode(&[1, 2, 3, 4, 5]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Zstd"));
        }
    }

    #[test]
    fn test_zstd_size_header_mismatch() {
        let mut compressed = encode(&[7u8; 64], 1).unwrap();
        compressed[0] = 65;
        assert!(matches!(decode(&compressed), Err(StripeError::ZstdError(_))));
    }
}
