// --- IN: src/null_handling/bitmap.rs ---

//! This module contains pure, stateless kernels for handling nullability.
//! Bitmaps are LSB-first within each byte, the same bit order arrow uses.

use arrow::buffer::NullBuffer;
use bitvec::prelude::*;

use crate::error::StripeError;

//==================================================================================
// 1. Bit Packing
//==================================================================================

/// Unpacks the first `num_bits` bits of an LSB-first bitmap.
pub fn unpack_bits(bytes: &[u8], num_bits: usize) -> Result<Vec<bool>, StripeError> {
    let bits = bytes.view_bits::<Lsb0>();
    if bits.len() < num_bits {
        return Err(StripeError::BitmapDecodeError {
            expected: num_bits,
            actual: bits.len(),
        });
    }
    Ok(bits[..num_bits].iter().by_vals().collect())
}

/// Packs booleans into an LSB-first bitmap, padding the last byte with zeros.
#[cfg(any(test, feature = "fixtures"))]
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bits: BitVec<u8, Lsb0> = BitVec::with_capacity(values.len());
    bits.extend(values.iter().copied());
    bits.into_vec()
}

//==================================================================================
// 2. Re-applying Validity
//==================================================================================

/// Re-applies a `present` mask to a dense vector of valid values, producing one
/// `Option` per row.
///
/// With no mask every row is valid, so `valid.len()` must equal `num_rows`.
pub fn scatter_valid<T>(
    valid: Vec<T>,
    present: Option<&[bool]>,
    num_rows: usize,
) -> Result<Vec<Option<T>>, StripeError> {
    let Some(present) = present else {
        if valid.len() != num_rows {
            return Err(StripeError::ChunkFormatError(format!(
                "Chunk declares {} rows but carries {} values and no present stream",
                num_rows,
                valid.len()
            )));
        }
        return Ok(valid.into_iter().map(Some).collect());
    };

    let expected_valid = present.iter().filter(|&&p| p).count();
    if present.len() != num_rows || expected_valid != valid.len() {
        return Err(StripeError::ChunkFormatError(format!(
            "Present stream marks {} of {} rows valid, but {} values were decoded",
            expected_valid,
            present.len(),
            valid.len()
        )));
    }

    let mut values = valid.into_iter();
    Ok(present
        .iter()
        .map(|&is_present| if is_present { values.next() } else { None })
        .collect())
}

/// Builds an arrow `NullBuffer` from a per-row validity mask.
/// Returns `None` when every row is valid, as arrow expects.
pub fn to_null_buffer(present: &[bool]) -> Option<NullBuffer> {
    if present.iter().all(|&p| p) {
        None
    } else {
        Some(NullBuffer::from(present.to_vec()))
    }
}
