//! The resolved column type: what a column becomes in the materialized dataset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type assigned to a column after reconciling its native encoding, the
/// inference defaults and any validated override.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
    String,
    Binary,
    Time,
    /// The caller asked to ignore the column; it decodes to all-missing.
    Bad,
}

impl ColumnType {
    /// All variants, in declaration order.
    pub const ALL: [ColumnType; 6] = [
        ColumnType::Numeric,
        ColumnType::Categorical,
        ColumnType::String,
        ColumnType::Binary,
        ColumnType::Time,
        ColumnType::Bad,
    ];

    /// The short name used in logs and issue messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Numeric => "Numeric",
            Self::Categorical => "Categorical",
            Self::String => "String",
            Self::Binary => "Binary",
            Self::Time => "Time",
            Self::Bad => "Bad",
        }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, Self::Bad)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
