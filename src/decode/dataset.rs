//! The materialized dataset a successful decode job exposes.
//!
//! Columns are plain arrow arrays. The dataset is immutable once built and is
//! shared behind an `Arc` with every reader, the oracle included.

use std::sync::Arc;

use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::compute::concat;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::decode::domain::{build_dictionary_column, LocalCategorical};
use crate::decode::stripe_decoder::DecodedPiece;
use crate::error::StripeError;
use crate::format::FileMetadata;
use crate::types::{ColumnType, NativeKind};

/// One decoded column.
#[derive(Debug, Clone)]
pub struct MaterializedColumn {
    name: String,
    native_kind: NativeKind,
    column_type: ColumnType,
    array: ArrayRef,
    domain: Option<Vec<String>>,
}

impl MaterializedColumn {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_kind(&self) -> &NativeKind {
        &self.native_kind
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn array(&self) -> &ArrayRef {
        &self.array
    }

    /// The sorted global domain of a categorical column.
    pub fn domain(&self) -> Option<&[String]> {
        self.domain.as_deref()
    }

    /// A bad column: every cell is missing.
    pub fn is_bad(&self) -> bool {
        self.column_type.is_bad()
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// `true` if row `row` holds no value.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.len()`, bad columns included.
    pub fn is_missing(&self, row: usize) -> bool {
        assert!(
            row < self.len(),
            "row {} is out of range for column '{}' of {} rows",
            row,
            self.name,
            self.len()
        );
        self.is_bad() || self.array.is_null(row)
    }
}

/// The decoded contents of one file, in file row order.
#[derive(Debug, Clone, Default)]
pub struct MaterializedDataset {
    columns: Vec<MaterializedColumn>,
    num_rows: usize,
    stripe_row_counts: Vec<u64>,
}

impl MaterializedDataset {
    /// The zero-row, zero-column result of a header-only file.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[MaterializedColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&MaterializedColumn> {
        self.columns.get(index)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&MaterializedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn stripe_row_counts(&self) -> &[u64] {
        &self.stripe_row_counts
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.name.clone(), c.array.data_type().clone(), true))
                .collect::<Vec<_>>(),
        ))
    }

    /// Exports the dataset as a single arrow `RecordBatch`.
    pub fn to_record_batch(&self) -> Result<RecordBatch, StripeError> {
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows));
        Ok(RecordBatch::try_new_with_options(
            self.schema(),
            self.columns.iter().map(|c| c.array.clone()).collect(),
            &options,
        )?)
    }
}

/// Joins per-stripe pieces into columns after every unit has finished.
///
/// `pieces[stripe][column]` must be fully populated.
pub(crate) fn assemble(
    metadata: &FileMetadata,
    column_types: &[ColumnType],
    pieces: Vec<Vec<DecodedPiece>>,
) -> Result<MaterializedDataset, StripeError> {
    let mut columns = Vec::with_capacity(metadata.columns.len());
    for (col, descriptor) in metadata.columns.iter().enumerate() {
        let column_type = column_types[col];
        let stripe_pieces: Vec<&DecodedPiece> = pieces.iter().map(|row| &row[col]).collect();

        let (array, domain) = if column_type == ColumnType::Categorical {
            let locals = stripe_pieces
                .iter()
                .map(|piece| match piece {
                    DecodedPiece::Categorical(local) => Ok(local),
                    DecodedPiece::Array(_) => Err(StripeError::InternalError(format!(
                        "column '{}' decoded without a local domain",
                        descriptor.name
                    ))),
                })
                .collect::<Result<Vec<&LocalCategorical>, _>>()?;
            let (array, domain) = build_dictionary_column(&locals)?;
            (array, Some(domain))
        } else {
            let arrays = stripe_pieces
                .iter()
                .map(|piece| match piece {
                    DecodedPiece::Array(array) => Ok(array.as_ref()),
                    DecodedPiece::Categorical(_) => Err(StripeError::InternalError(format!(
                        "column '{}' produced an unexpected local domain",
                        descriptor.name
                    ))),
                })
                .collect::<Result<Vec<&dyn Array>, _>>()?;
            let array = if arrays.is_empty() {
                new_empty_array(&descriptor.native_kind.materialized_arrow_type(column_type))
            } else {
                concat(&arrays)?
            };
            (array, None)
        };

        columns.push(MaterializedColumn {
            name: descriptor.name.clone(),
            native_kind: descriptor.native_kind.clone(),
            column_type,
            array,
            domain,
        });
    }

    let num_rows = usize::try_from(metadata.num_rows()).map_err(|_| {
        StripeError::InternalError(format!("{} rows do not fit in memory", metadata.num_rows()))
    })?;
    if let Some(bad) = columns.iter().find(|c| c.len() != num_rows) {
        return Err(StripeError::InternalError(format!(
            "column '{}' has {} rows, file has {}",
            bad.name,
            bad.len(),
            num_rows
        )));
    }

    Ok(MaterializedDataset {
        columns,
        num_rows,
        stripe_row_counts: metadata.stripes.iter().map(|s| s.num_rows).collect(),
    })
}
