//! Parse configurations: the mutable `ParseSetup` callers edit, and the
//! `FrozenSetup` a decode job owns.

use std::fmt;

use crate::error::StripeError;
use crate::schema::validator::RejectionReason;
use crate::types::{ColumnType, NativeKind};

/// The parse type name reported for STRF files.
pub const PARSE_TYPE: &str = "STRF";

/// A non-fatal configuration problem. Issues are collected, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseIssue {
    /// A requested column type was refused; the column keeps `kept`.
    UnsupportedTypeOverride {
        ordinal: usize,
        column: String,
        native_kind: NativeKind,
        requested: ColumnType,
        kept: ColumnType,
        reason: RejectionReason,
    },
}

impl ParseIssue {
    pub fn ordinal(&self) -> usize {
        match self {
            Self::UnsupportedTypeOverride { ordinal, .. } => *ordinal,
        }
    }

    /// `true` while a column set to `current` still reflects this issue:
    /// the refused type is still requested, or the fallback is still in place.
    pub fn applies_to(&self, current: ColumnType) -> bool {
        match self {
            Self::UnsupportedTypeOverride {
                requested, kept, ..
            } => current == *requested || current == *kept,
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedTypeOverride {
                ordinal,
                column,
                native_kind,
                requested,
                kept,
                reason,
            } => write!(
                f,
                "Unsupported type override for column {} '{}' ({}): cannot read as {}, keeping {} ({})",
                ordinal, column, native_kind, requested, kept, reason
            ),
        }
    }
}

/// Renders issues the way both setups and jobs report them: one per line.
pub fn render_issues(issues: &[ParseIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

//==================================================================================
// ParseSetup
//==================================================================================

/// The editable parse configuration.
///
/// Produced by [`crate::schema::guess_setup`]; callers may change column types
/// with [`ParseSetup::set_column_type`] and feed the setup back in as a prior.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseSetup {
    column_names: Vec<String>,
    column_types: Vec<ColumnType>,
    errors: Vec<ParseIssue>,
}

impl ParseSetup {
    pub(crate) fn new(
        column_names: Vec<String>,
        column_types: Vec<ColumnType>,
        errors: Vec<ParseIssue>,
    ) -> Self {
        Self {
            column_names,
            column_types,
            errors,
        }
    }

    /// A setup carrying only caller-chosen types, for files whose names are
    /// not known yet.
    pub fn with_column_types(column_types: Vec<ColumnType>) -> Self {
        Self {
            column_names: Vec::new(),
            column_types,
            errors: Vec::new(),
        }
    }

    pub fn parse_type(&self) -> &'static str {
        PARSE_TYPE
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn num_columns(&self) -> usize {
        self.column_types.len()
    }

    pub fn errors(&self) -> &[ParseIssue] {
        &self.errors
    }

    /// Requests a type for one column. The request is only checked against
    /// the file on the next inference or at job submission.
    pub fn set_column_type(&mut self, index: usize, column_type: ColumnType) -> Result<(), StripeError> {
        let len = self.column_types.len();
        let slot = self
            .column_types
            .get_mut(index)
            .ok_or(StripeError::ColumnIndexOutOfRange { index, len })?;
        *slot = column_type;
        Ok(())
    }

    pub fn freeze(self) -> FrozenSetup {
        FrozenSetup {
            column_names: self.column_names,
            column_types: self.column_types,
            issues: self.errors,
        }
    }
}

//==================================================================================
// FrozenSetup
//==================================================================================

/// A validated, read-only setup. Only the owning decode job holds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenSetup {
    column_names: Vec<String>,
    column_types: Vec<ColumnType>,
    issues: Vec<ParseIssue>,
}

impl FrozenSetup {
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }
}
