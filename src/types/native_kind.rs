//! This module defines the canonical representation of a column's on-disk
//! encoding, as declared by the STRF file footer.

use arrow::datatypes::{DataType as ArrowDataType, TimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ColumnType;

/// The native encoded kind of a column.
///
/// The footer serializes this as an internally tagged object, e.g.
/// `{"kind":"decimal","precision":10,"scale":2}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Binary,
    Decimal { precision: u8, scale: u8 },
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// Days since the Unix epoch.
    Date,
    /// Struct, list, map, union and anything else the reader cannot interpret.
    Unsupported { type_name: String },
}

impl NativeKind {
    /// Returns `true` for kinds stored as zig-zag varints.
    pub fn is_varint(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Decimal { .. }
                | Self::Timestamp
                | Self::Date
        )
    }

    /// Returns `true` if the data type is a floating-point number.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns `true` for kinds that carry numeric values.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Float32
                | Self::Float64
                | Self::Boolean
                | Self::Decimal { .. }
        )
    }

    /// Returns `true` for kinds that may become categorical or string columns.
    pub fn is_string_eligible(&self) -> bool {
        matches!(self, Self::String)
    }

    /// Returns `true` for the kinds that carry a point in time.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Timestamp | Self::Date)
    }

    /// The default resolved type of this kind before cardinality is considered.
    ///
    /// `distinct_count` is the union of distinct values over all stripes for
    /// string columns, or `None` when at least one stripe did not record it.
    pub fn default_column_type(&self, distinct_count: Option<usize>, limit: usize) -> ColumnType {
        match self {
            Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::Int64
            | Self::Float32
            | Self::Float64
            | Self::Boolean
            | Self::Decimal { .. } => ColumnType::Numeric,
            Self::String => match distinct_count {
                Some(count) if count < limit => ColumnType::Categorical,
                _ => ColumnType::String,
            },
            Self::Binary => ColumnType::Binary,
            Self::Timestamp | Self::Date => ColumnType::Time,
            Self::Unsupported { .. } => ColumnType::Bad,
        }
    }

    /// The arrow type a column of this kind materializes to under `column_type`.
    pub fn materialized_arrow_type(&self, column_type: ColumnType) -> ArrowDataType {
        match column_type {
            ColumnType::Numeric => match self {
                Self::Float32 | Self::Float64 | Self::Decimal { .. } => ArrowDataType::Float64,
                _ => ArrowDataType::Int64,
            },
            ColumnType::Categorical => ArrowDataType::Dictionary(
                Box::new(ArrowDataType::Int32),
                Box::new(ArrowDataType::Utf8),
            ),
            ColumnType::String => ArrowDataType::Utf8,
            ColumnType::Binary => ArrowDataType::Binary,
            ColumnType::Time => ArrowDataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnType::Bad => ArrowDataType::Null,
        }
    }

    /// The name written into every column chunk header.
    pub fn chunk_type_name(&self) -> String {
        match self {
            Self::Decimal { precision, scale } => format!("Decimal({precision},{scale})"),
            Self::Unsupported { type_name } => format!("Unsupported({type_name})"),
            other => format!("{:?}", other),
        }
    }
}

/// Provides the canonical string representation for a `NativeKind`.
impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // These string representations are part of the public contract: they
        // appear verbatim in chunk headers and in override rejection messages.
        write!(f, "{}", self.chunk_type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_json_shape() {
        let kind = NativeKind::Decimal {
            precision: 10,
            scale: 2,
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"kind":"decimal","precision":10,"scale":2}"#);

        let parsed: NativeKind = serde_json::from_str(r#"{"kind":"int64"}"#).unwrap();
        assert_eq!(parsed, NativeKind::Int64);

        let parsed: NativeKind =
            serde_json::from_str(r#"{"kind":"unsupported","type_name":"struct<a:int>"}"#)
                .unwrap();
        assert_eq!(parsed.to_string(), "Unsupported(struct<a:int>)");
    }

    #[test]
    fn test_default_mapping_is_total() {
        let limit = 4;
        assert_eq!(NativeKind::Int32.default_column_type(None, limit), ColumnType::Numeric);
        assert_eq!(NativeKind::Boolean.default_column_type(None, limit), ColumnType::Numeric);
        assert_eq!(
            NativeKind::Decimal { precision: 5, scale: 1 }.default_column_type(None, limit),
            ColumnType::Numeric
        );
        assert_eq!(NativeKind::Date.default_column_type(None, limit), ColumnType::Time);
        assert_eq!(NativeKind::Binary.default_column_type(Some(1), limit), ColumnType::Binary);
        assert_eq!(
            NativeKind::Unsupported { type_name: "map".into() }.default_column_type(None, limit),
            ColumnType::Bad
        );
    }

    #[test]
    fn test_string_cardinality_threshold() {
        assert_eq!(NativeKind::String.default_column_type(Some(3), 4), ColumnType::Categorical);
        assert_eq!(NativeKind::String.default_column_type(Some(4), 4), ColumnType::String);
        // Missing statistics in any stripe means the cardinality is unknown.
        assert_eq!(NativeKind::String.default_column_type(None, 4), ColumnType::String);
    }
}
