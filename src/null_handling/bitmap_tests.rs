//==================================================================================
// Unit Tests for the bitmap kernels
//==================================================================================

use crate::error::StripeError;
use crate::null_handling::bitmap::*;

#[test]
fn test_pack_bits_is_lsb_first() {
    let packed = pack_bits(&[true, false, false, false, false, false, false, false, true]);
    assert_eq!(packed, vec![0b0000_0001, 0b0000_0001]);
}

#[test]
fn test_unpack_inverts_pack() {
    let original = vec![true, false, true, true, false, false, true, false, true, true];
    let packed = pack_bits(&original);
    assert_eq!(packed.len(), 2);
    assert_eq!(unpack_bits(&packed, original.len()).unwrap(), original);
}

#[test]
fn test_unpack_rejects_short_bitmap() {
    let result = unpack_bits(&[0xFF], 9);
    assert!(matches!(
        result,
        Err(StripeError::BitmapDecodeError {
            expected: 9,
            actual: 8
        })
    ));
}

#[test]
fn test_scatter_valid_with_nulls() {
    let present = [true, false, true];
    let rows = scatter_valid(vec![10, 30], Some(&present), 3).unwrap();
    assert_eq!(rows, vec![Some(10), None, Some(30)]);
}

#[test]
fn test_scatter_valid_no_nulls() {
    let rows = scatter_valid(vec![10, 20, 30], None, 3).unwrap();
    assert_eq!(rows, vec![Some(10), Some(20), Some(30)]);
}

#[test]
fn test_scatter_valid_all_null() {
    let present = [false, false];
    let rows: Vec<Option<i64>> = scatter_valid(Vec::new(), Some(&present), 2).unwrap();
    assert_eq!(rows, vec![None, None]);
}

#[test]
fn test_scatter_valid_count_mismatch() {
    let present = [true, true, false];
    assert!(scatter_valid(vec![1], Some(&present), 3).is_err());
    assert!(scatter_valid(vec![1, 2], None, 3).is_err());
}

#[test]
fn test_to_null_buffer() {
    assert!(to_null_buffer(&[true, true]).is_none());
    let nulls = to_null_buffer(&[true, false, true]).unwrap();
    assert_eq!(nulls.null_count(), 1);
    assert!(nulls.is_null(1));
}
