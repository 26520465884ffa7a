// In: src/schema/inference.rs

//! The Schema Inference Engine.
//!
//! Proposes a resolved type per column from the footer and folds a caller's
//! prior setup through the validator. Rejections are collected as issues and
//! the column falls back to its inferred default.

use crate::config::DecodeConfig;
use crate::error::StripeError;
use crate::format::{FileMetadata, SourceFile};
use crate::schema::setup::{FrozenSetup, ParseIssue, ParseSetup};
use crate::schema::validator;
use crate::types::ColumnType;

/// Infers (or re-validates) the parse setup for `file`.
///
/// A header-only file yields an empty setup. Conflicting stripe column names
/// fail with `InconsistentStripeSchema`; a prior with the wrong number of
/// types fails with `ColumnCountMismatch`.
pub fn guess_setup(
    file: &SourceFile,
    prior: Option<&ParseSetup>,
    config: &DecodeConfig,
) -> Result<ParseSetup, StripeError> {
    let metadata = match file.metadata() {
        Ok(metadata) => metadata,
        Err(StripeError::EmptyFile(path)) => {
            log::info!("{} holds no data; using an empty setup", path.display());
            return Ok(ParseSetup::default());
        }
        Err(e) => return Err(e),
    };
    file.ensure_uniform_stripe_schema(&metadata)?;
    infer(&metadata, prior, config)
}

/// Re-resolves a submitted setup against the file and freezes it.
///
/// The frozen issue list is the setup's carried errors plus any new
/// rejections, de-duplicated and ordered by column ordinal. A carried error
/// is dropped once its column has been set to a type it does not concern.
pub(crate) fn resolve_for_decode(
    metadata: &FileMetadata,
    submitted: &ParseSetup,
    config: &DecodeConfig,
) -> Result<FrozenSetup, StripeError> {
    let resolved = infer(metadata, Some(submitted), config)?;

    let mut issues: Vec<ParseIssue> = submitted
        .errors()
        .iter()
        .filter(|issue| {
            let current = submitted.column_types().get(issue.ordinal()).copied();
            let applies = current.is_some_and(|t| issue.applies_to(t));
            if !applies {
                log::debug!("Dropping stale issue: {}", issue);
            }
            applies
        })
        .cloned()
        .collect();
    for issue in resolved.errors() {
        if !issues.contains(issue) {
            issues.push(issue.clone());
        }
    }
    // Stable: issues for the same column keep their relative order.
    issues.sort_by_key(ParseIssue::ordinal);

    Ok(ParseSetup::new(
        resolved.column_names().to_vec(),
        resolved.column_types().to_vec(),
        issues,
    )
    .freeze())
}

pub(crate) fn infer(
    metadata: &FileMetadata,
    prior: Option<&ParseSetup>,
    config: &DecodeConfig,
) -> Result<ParseSetup, StripeError> {
    // 1. Defaults from the native kinds and string cardinality.
    let defaults: Vec<ColumnType> = metadata
        .columns
        .iter()
        .map(|col| {
            let distinct = metadata
                .distinct_value_union(col.ordinal)
                .map(|values| values.len());
            col.native_kind
                .default_column_type(distinct, config.categorical_cardinality_limit)
        })
        .collect();

    let Some(prior) = prior else {
        return Ok(ParseSetup::new(metadata.column_names(), defaults, Vec::new()));
    };

    if prior.num_columns() != metadata.columns.len() {
        return Err(StripeError::ColumnCountMismatch {
            expected: metadata.columns.len(),
            found: prior.num_columns(),
        });
    }

    // 2. Fold the prior through the validator in ordinal order.
    let mut column_types = Vec::with_capacity(defaults.len());
    let mut errors = Vec::new();
    for ((column, &default), &requested) in metadata
        .columns
        .iter()
        .zip(&defaults)
        .zip(prior.column_types())
    {
        if requested == default {
            column_types.push(default);
            continue;
        }
        match validator::validate(column, requested) {
            Ok(()) => {
                log::debug!(
                    "Column {} '{}': override {} -> {} accepted",
                    column.ordinal,
                    column.name,
                    default,
                    requested
                );
                column_types.push(requested);
            }
            Err(reason) => {
                let issue = ParseIssue::UnsupportedTypeOverride {
                    ordinal: column.ordinal,
                    column: column.name.clone(),
                    native_kind: column.native_kind.clone(),
                    requested,
                    kept: default,
                    reason,
                };
                log::warn!("{}", issue);
                errors.push(issue);
                column_types.push(default);
            }
        }
    }

    log_metric!(
        "event" = "guess_setup",
        "columns" = &column_types.len(),
        "rejected_overrides" = &errors.len()
    );

    Ok(ParseSetup::new(metadata.column_names(), column_types, errors))
}
