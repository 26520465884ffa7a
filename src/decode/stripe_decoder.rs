// In: src/decode/stripe_decoder.rs

//! Decodes the column chunks of one decode unit into typed pieces.
//!
//! A unit is a stripe, or a contiguous run of a large stripe's columns. Each
//! unit reads one byte range and produces one `DecodedPiece` per column.

use std::ops::Range;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, ArrowPrimitiveType, BinaryArray, NullArray, PrimitiveArray, StringArray,
};
use arrow::buffer::ScalarBuffer;
use arrow::datatypes::{Float64Type, Int64Type, TimestampMillisecondType};

use crate::decode::domain::LocalCategorical;
use crate::error::StripeError;
use crate::format::{
    ChunkEncoding, ChunkLayout, ColumnChunk, ColumnDescriptor, FileMetadata, SourceFile, Stripe,
    STREAM_DATA, STREAM_DICTIONARY_DATA, STREAM_DICTIONARY_LENGTH, STREAM_LENGTH, STREAM_PRESENT,
};
use crate::kernels;
use crate::null_handling::{scatter_valid, to_null_buffer, unpack_bits};
use crate::types::{ColumnType, NativeKind};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// One column's decoded rows from one unit.
#[derive(Debug, Clone)]
pub enum DecodedPiece {
    Array(ArrayRef),
    /// Categorical columns keep their unit-local domain until the merge.
    Categorical(LocalCategorical),
}

/// A parallel unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeUnit {
    pub stripe: usize,
    pub columns: Range<usize>,
}

/// Splits the file into units: one per stripe, except that stripes above
/// `large_stripe_rows` rows are split into runs of `columns_per_split` columns.
pub fn plan_units(
    metadata: &FileMetadata,
    large_stripe_rows: u64,
    columns_per_split: usize,
) -> Vec<DecodeUnit> {
    let num_columns = metadata.columns.len();
    let step = columns_per_split.max(1);
    let mut units = Vec::new();
    for stripe in &metadata.stripes {
        if stripe.num_rows > large_stripe_rows && num_columns > 1 {
            let mut start = 0;
            while start < num_columns {
                let end = (start + step).min(num_columns);
                units.push(DecodeUnit {
                    stripe: stripe.index,
                    columns: start..end,
                });
                start = end;
            }
        } else {
            units.push(DecodeUnit {
                stripe: stripe.index,
                columns: 0..num_columns,
            });
        }
    }
    units
}

/// Decodes every column of `unit`.
pub fn decode_unit(
    source: &SourceFile,
    metadata: &FileMetadata,
    column_types: &[ColumnType],
    unit: &DecodeUnit,
) -> Result<Vec<DecodedPiece>, StripeError> {
    let stripe = metadata.stripes.get(unit.stripe).ok_or_else(|| {
        StripeError::InternalError(format!("unit refers to missing stripe {}", unit.stripe))
    })?;
    let num_rows = usize::try_from(stripe.num_rows).map_err(|_| {
        StripeError::ChunkFormatError(format!("stripe row count {} is too large", stripe.num_rows))
    })?;

    // 1. Locate the chunks this unit must read. Bad columns are never read.
    let mut wanted = Vec::new();
    for col in unit.columns.clone() {
        if column_types[col].is_bad() {
            continue;
        }
        let location = stripe.chunk(col).ok_or_else(|| {
            StripeError::ChunkFormatError(format!(
                "stripe {} has no chunk for column {}",
                stripe.index, col
            ))
        })?;
        wanted.push(location);
    }

    // 2. One read covering all of them.
    let buffer = match (
        wanted.iter().map(|l| l.offset_in_file).min(),
        wanted.iter().map(|l| l.offset_in_file + l.size).max(),
    ) {
        (Some(start), Some(end)) => Some((start, source.read_range(start, end - start)?)),
        _ => None,
    };

    // 3. Decode column by column.
    let mut pieces = Vec::with_capacity(unit.columns.len());
    for col in unit.columns.clone() {
        let descriptor = &metadata.columns[col];
        let column_type = column_types[col];
        if column_type.is_bad() {
            pieces.push(DecodedPiece::Array(Arc::new(NullArray::new(num_rows))));
            continue;
        }
        let chunk = chunk_from_buffer(stripe, col, buffer.as_ref())?;
        pieces.push(decode_chunk(&chunk, descriptor, column_type, num_rows)?);
    }
    Ok(pieces)
}

fn chunk_from_buffer(
    stripe: &Stripe,
    col: usize,
    buffer: Option<&(u64, Vec<u8>)>,
) -> Result<ColumnChunk, StripeError> {
    let location = stripe
        .chunk(col)
        .ok_or_else(|| StripeError::InternalError(format!("column {} vanished", col)))?;
    let (start, bytes) =
        buffer.ok_or_else(|| StripeError::InternalError("unit buffer was not read".into()))?;
    let from = (location.offset_in_file - start) as usize;
    let to = from + location.size as usize;
    ColumnChunk::from_bytes(&bytes[from..to])
}

//==================================================================================
// Chunk decoding
//==================================================================================

/// Decodes one column chunk of `num_rows` rows as `column_type`.
pub fn decode_chunk(
    chunk: &ColumnChunk,
    descriptor: &ColumnDescriptor,
    column_type: ColumnType,
    num_rows: usize,
) -> Result<DecodedPiece, StripeError> {
    if column_type.is_bad() {
        return Ok(DecodedPiece::Array(Arc::new(NullArray::new(num_rows))));
    }

    let kind = &descriptor.native_kind;
    if chunk.native_type != kind.chunk_type_name() {
        return Err(StripeError::ChunkFormatError(format!(
            "column '{}' is declared {} but its chunk holds {}",
            descriptor.name, kind, chunk.native_type
        )));
    }
    if chunk.total_rows != num_rows as u64 {
        return Err(StripeError::ChunkFormatError(format!(
            "column '{}' chunk holds {} rows, stripe declares {}",
            descriptor.name, chunk.total_rows, num_rows
        )));
    }

    let encoding = chunk.encoding()?;
    let present = chunk
        .stream(STREAM_PRESENT, encoding.codec)?
        .map(|bytes| unpack_bits(&bytes, num_rows))
        .transpose()?;
    let present = present.as_deref();
    let valid_count = present.map_or(num_rows, |p| p.iter().filter(|&&b| b).count());

    let piece = match (kind, column_type) {
        (
            NativeKind::Int8 | NativeKind::Int16 | NativeKind::Int32 | NativeKind::Int64,
            ColumnType::Numeric,
        ) => {
            let values = signed_values(chunk, encoding, valid_count)?;
            check_width(kind, &values)?;
            primitive::<Int64Type>(values, present, num_rows)?
        }
        (NativeKind::Decimal { scale, .. }, ColumnType::Numeric) => {
            let values = signed_values(chunk, encoding, valid_count)?
                .into_iter()
                .map(|unscaled| scale_decimal(unscaled, *scale))
                .collect::<Result<Vec<_>, _>>()?;
            primitive::<Float64Type>(values, present, num_rows)?
        }
        (NativeKind::Float32, ColumnType::Numeric) => {
            let data = chunk.required_stream(STREAM_DATA, encoding.codec)?;
            let values = kernels::bitcast::decode::<f32>(&data, valid_count)?
                .into_iter()
                .map(f64::from)
                .collect();
            primitive::<Float64Type>(values, present, num_rows)?
        }
        (NativeKind::Float64, ColumnType::Numeric) => {
            let data = chunk.required_stream(STREAM_DATA, encoding.codec)?;
            let values = kernels::bitcast::decode::<f64>(&data, valid_count)?;
            primitive::<Float64Type>(values, present, num_rows)?
        }
        (NativeKind::Boolean, ColumnType::Numeric) => {
            let data = chunk.required_stream(STREAM_DATA, encoding.codec)?;
            let values = unpack_bits(&data, valid_count)?
                .into_iter()
                .map(i64::from)
                .collect();
            primitive::<Int64Type>(values, present, num_rows)?
        }
        (NativeKind::Timestamp, ColumnType::Time) => {
            let values = signed_values(chunk, encoding, valid_count)?;
            primitive::<TimestampMillisecondType>(values, present, num_rows)?
        }
        (NativeKind::Date, ColumnType::Time) => {
            let values = signed_values(chunk, encoding, valid_count)?
                .into_iter()
                .map(|days| {
                    days.checked_mul(MILLIS_PER_DAY).ok_or_else(|| {
                        StripeError::ChunkFormatError(format!("date {} days is out of range", days))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            primitive::<TimestampMillisecondType>(values, present, num_rows)?
        }
        (NativeKind::String, ColumnType::String | ColumnType::Categorical) => {
            let strings = byte_values(chunk, encoding, valid_count)?
                .into_iter()
                .map(|bytes| {
                    String::from_utf8(bytes).map_err(|e| {
                        StripeError::ChunkFormatError(format!("invalid UTF-8 in string column: {}", e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let rows = scatter_valid(strings, present, num_rows)?;
            if column_type == ColumnType::Categorical {
                return Ok(DecodedPiece::Categorical(LocalCategorical::from_values(rows)));
            }
            Arc::new(StringArray::from_iter(rows)) as ArrayRef
        }
        (NativeKind::Binary, ColumnType::Binary) => {
            let values = byte_values(chunk, encoding, valid_count)?;
            let rows = scatter_valid(values, present, num_rows)?;
            Arc::new(BinaryArray::from_iter(rows)) as ArrayRef
        }
        (kind, column_type) => {
            return Err(StripeError::InternalError(format!(
                "column '{}': {} cannot be materialized as {}",
                descriptor.name, kind, column_type
            )))
        }
    };
    Ok(DecodedPiece::Array(piece))
}

fn signed_values(
    chunk: &ColumnChunk,
    encoding: ChunkEncoding,
    valid_count: usize,
) -> Result<Vec<i64>, StripeError> {
    let data = chunk.required_stream(STREAM_DATA, encoding.codec)?;
    kernels::decode_signed_varints(&data, valid_count)
}

/// The f64 nearest to `unscaled * 10^-scale`, rounded once.
fn scale_decimal(unscaled: i64, scale: u8) -> Result<f64, StripeError> {
    let literal = format!("{}E-{}", unscaled, scale);
    literal.parse::<f64>().map_err(|e| {
        StripeError::ChunkFormatError(format!("decimal {} is not a number: {}", literal, e))
    })
}

/// Rejects values that do not fit the declared integer width.
fn check_width(kind: &NativeKind, values: &[i64]) -> Result<(), StripeError> {
    let (min, max) = match kind {
        NativeKind::Int8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
        NativeKind::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
        NativeKind::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => return Ok(()),
    };
    match values.iter().find(|v| **v < min || **v > max) {
        Some(v) => Err(StripeError::ChunkFormatError(format!(
            "value {} does not fit {}",
            v, kind
        ))),
        None => Ok(()),
    }
}

/// Reads the valid values of a string or binary chunk in row order.
fn byte_values(
    chunk: &ColumnChunk,
    encoding: ChunkEncoding,
    valid_count: usize,
) -> Result<Vec<Vec<u8>>, StripeError> {
    let codec = encoding.codec;
    match encoding.layout {
        ChunkLayout::Direct => {
            let lengths =
                kernels::decode_unsigned_varints(&chunk.required_stream(STREAM_LENGTH, codec)?, valid_count)?;
            let data = chunk.required_stream(STREAM_DATA, codec)?;
            split_by_lengths(&data, &lengths)
        }
        ChunkLayout::Dictionary => {
            let dict_lengths = kernels::leb128::decode_to_end::<u64>(
                &chunk.required_stream(STREAM_DICTIONARY_LENGTH, codec)?,
            )?;
            let dict_data = chunk.required_stream(STREAM_DICTIONARY_DATA, codec)?;
            let dictionary = split_by_lengths(&dict_data, &dict_lengths)?;
            let indices =
                kernels::decode_unsigned_varints(&chunk.required_stream(STREAM_DATA, codec)?, valid_count)?;
            indices
                .into_iter()
                .map(|idx| {
                    dictionary.get(idx as usize).cloned().ok_or_else(|| {
                        StripeError::ChunkFormatError(format!(
                            "dictionary index {} out of range for {} entries",
                            idx,
                            dictionary.len()
                        ))
                    })
                })
                .collect()
        }
    }
}

fn split_by_lengths(data: &[u8], lengths: &[u64]) -> Result<Vec<Vec<u8>>, StripeError> {
    let mut values = Vec::with_capacity(lengths.len());
    let mut offset = 0usize;
    for &len in lengths {
        let end = offset
            .checked_add(len as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                StripeError::ChunkFormatError(format!(
                    "length stream overruns {} data bytes",
                    data.len()
                ))
            })?;
        values.push(data[offset..end].to_vec());
        offset = end;
    }
    if offset != data.len() {
        return Err(StripeError::ChunkFormatError(format!(
            "{} trailing bytes after the last value",
            data.len() - offset
        )));
    }
    Ok(values)
}

/// Builds a primitive array from dense valid values and an optional mask.
fn primitive<T: ArrowPrimitiveType>(
    valid: Vec<T::Native>,
    present: Option<&[bool]>,
    num_rows: usize,
) -> Result<ArrayRef, StripeError> {
    let Some(mask) = present else {
        if valid.len() != num_rows {
            return Err(StripeError::ChunkFormatError(format!(
                "expected {} values, decoded {}",
                num_rows,
                valid.len()
            )));
        }
        return Ok(Arc::new(PrimitiveArray::<T>::new(ScalarBuffer::from(valid), None)));
    };
    let dense: Vec<T::Native> = scatter_valid(valid, Some(mask), num_rows)?
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
    Ok(Arc::new(PrimitiveArray::<T>::new(
        ScalarBuffer::from(dense),
        to_null_buffer(mask),
    )))
}
