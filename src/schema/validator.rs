//! The Type Override Validator.
//!
//! A pure function over `(native kind, requested type)`. The compatibility
//! table below is the only place that decides whether an override can be
//! honored without data loss or ambiguity.

use std::fmt;

use crate::format::ColumnDescriptor;
use crate::types::{ColumnType, NativeKind};

/// Why an override was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// A numeric column cannot be read as categorical or string.
    NumericAsText,
    /// A string column cannot be read as numeric.
    TextAsNumeric,
    /// Any other pairing the table forbids.
    Incompatible,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericAsText => f.write_str("numeric values cannot be read as text"),
            Self::TextAsNumeric => f.write_str("text values cannot be read as numbers"),
            Self::Incompatible => f.write_str("the native encoding does not support this type"),
        }
    }
}

/// The coarse family a native kind belongs to for override purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeClass {
    Numeric,
    Text,
    Binary,
    Temporal,
    Unsupported,
}

fn native_class(kind: &NativeKind) -> NativeClass {
    match kind {
        NativeKind::Int8
        | NativeKind::Int16
        | NativeKind::Int32
        | NativeKind::Int64
        | NativeKind::Float32
        | NativeKind::Float64
        | NativeKind::Boolean
        | NativeKind::Decimal { .. } => NativeClass::Numeric,
        NativeKind::String => NativeClass::Text,
        NativeKind::Binary => NativeClass::Binary,
        NativeKind::Timestamp | NativeKind::Date => NativeClass::Temporal,
        NativeKind::Unsupported { .. } => NativeClass::Unsupported,
    }
}

/// The compatibility table.
///
/// | native \ requested | Numeric | Categorical | String | Binary | Time | Bad |
/// |---|---|---|---|---|---|---|
/// | numeric            | ok | no | no | no | no | ok |
/// | string             | no | ok | ok | no | no | ok |
/// | binary             | no | no | no | ok | no | ok |
/// | timestamp/date     | no | no | no | no | ok | ok |
/// | unsupported        | no | no | no | no | no | ok |
fn check(class: NativeClass, requested: ColumnType) -> Result<(), RejectionReason> {
    use ColumnType as T;
    use NativeClass as C;
    match (class, requested) {
        (_, T::Bad) => Ok(()),

        (C::Numeric, T::Numeric) => Ok(()),
        (C::Numeric, T::Categorical | T::String) => Err(RejectionReason::NumericAsText),
        (C::Numeric, T::Binary | T::Time) => Err(RejectionReason::Incompatible),

        (C::Text, T::Categorical | T::String) => Ok(()),
        (C::Text, T::Numeric) => Err(RejectionReason::TextAsNumeric),
        (C::Text, T::Binary | T::Time) => Err(RejectionReason::Incompatible),

        (C::Binary, T::Binary) => Ok(()),
        (C::Binary, T::Numeric | T::Categorical | T::String | T::Time) => {
            Err(RejectionReason::Incompatible)
        }

        (C::Temporal, T::Time) => Ok(()),
        (C::Temporal, T::Numeric | T::Categorical | T::String | T::Binary) => {
            Err(RejectionReason::Incompatible)
        }

        (C::Unsupported, T::Numeric | T::Categorical | T::String | T::Binary | T::Time) => {
            Err(RejectionReason::Incompatible)
        }
    }
}

/// Decides whether `column` may be materialized as `requested`.
pub fn validate(column: &ColumnDescriptor, requested: ColumnType) -> Result<(), RejectionReason> {
    check(native_class(&column.native_kind), requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: NativeKind) -> ColumnDescriptor {
        ColumnDescriptor {
            name: "c".into(),
            ordinal: 0,
            native_kind: kind,
            nullable: true,
        }
    }

    fn all_kinds() -> Vec<NativeKind> {
        vec![
            NativeKind::Int8,
            NativeKind::Int16,
            NativeKind::Int32,
            NativeKind::Int64,
            NativeKind::Float32,
            NativeKind::Float64,
            NativeKind::Boolean,
            NativeKind::String,
            NativeKind::Binary,
            NativeKind::Decimal {
                precision: 10,
                scale: 2,
            },
            NativeKind::Timestamp,
            NativeKind::Date,
            NativeKind::Unsupported {
                type_name: "struct<a:int>".into(),
            },
        ]
    }

    #[test]
    fn test_compatibility_table_is_exhaustive() {
        for kind in all_kinds() {
            let col = column(kind.clone());
            let accepted: Vec<ColumnType> = ColumnType::ALL
                .into_iter()
                .filter(|t| validate(&col, *t).is_ok())
                .collect();
            let expected = match kind {
                NativeKind::String => vec![ColumnType::Categorical, ColumnType::String, ColumnType::Bad],
                NativeKind::Binary => vec![ColumnType::Binary, ColumnType::Bad],
                NativeKind::Timestamp | NativeKind::Date => vec![ColumnType::Time, ColumnType::Bad],
                NativeKind::Unsupported { .. } => vec![ColumnType::Bad],
                _ => vec![ColumnType::Numeric, ColumnType::Bad],
            };
            assert_eq!(accepted, expected, "kind {}", kind);
        }
    }

    #[test]
    fn test_default_type_is_always_accepted() {
        for kind in all_kinds() {
            for distinct in [Some(1), None] {
                let default = kind.default_column_type(distinct, 100);
                assert!(validate(&column(kind.clone()), default).is_ok());
            }
        }
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(
            validate(&column(NativeKind::Float64), ColumnType::String),
            Err(RejectionReason::NumericAsText)
        );
        assert_eq!(
            validate(&column(NativeKind::Int64), ColumnType::Categorical),
            Err(RejectionReason::NumericAsText)
        );
        assert_eq!(
            validate(&column(NativeKind::String), ColumnType::Numeric),
            Err(RejectionReason::TextAsNumeric)
        );
        assert_eq!(
            validate(&column(NativeKind::Date), ColumnType::Numeric),
            Err(RejectionReason::Incompatible)
        );
    }
}
