//==================================================================================
// Schema inference tests
//==================================================================================

use std::path::PathBuf;

use crate::config::DecodeConfig;
use crate::error::StripeError;
use crate::fixtures::{self, FixtureColumn, FixtureFile, FixtureStripe, FixtureValue};
use crate::format::SourceFile;
use crate::schema::{guess_setup, render_issues, ParseIssue, ParseSetup, RejectionReason};
use crate::types::{ColumnType, NativeKind};

fn write(dir: &tempfile::TempDir, name: &str, file: &FixtureFile) -> PathBuf {
    let path = dir.path().join(name);
    file.write_to(&path).unwrap();
    path
}

#[test]
fn test_default_types_for_split_elim_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();

    let setup = guess_setup(&source, None, &DecodeConfig::default()).unwrap();
    assert_eq!(
        setup.column_names(),
        &["userid", "string1", "subtype", "decimal1", "ts"]
    );
    assert_eq!(
        setup.column_types(),
        &[
            ColumnType::Numeric,
            ColumnType::Categorical,
            ColumnType::Numeric,
            ColumnType::Numeric,
            ColumnType::Time,
        ]
    );
    assert!(setup.errors().is_empty());
}

#[test]
fn test_high_cardinality_string_defaults_to_string() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();

    // Six distinct values: a limit of six is not strictly above the count.
    let config = DecodeConfig {
        categorical_cardinality_limit: 6,
        ..Default::default()
    };
    let setup = guess_setup(&source, None, &config).unwrap();
    assert_eq!(setup.column_types()[1], ColumnType::String);

    let config = DecodeConfig {
        categorical_cardinality_limit: 7,
        ..Default::default()
    };
    let setup = guess_setup(&source, None, &config).unwrap();
    assert_eq!(setup.column_types()[1], ColumnType::Categorical);
}

#[test]
fn test_missing_distinct_stats_default_to_string() {
    let dir = tempfile::tempdir().unwrap();
    let file = FixtureFile::new(vec![FixtureColumn::new("s", NativeKind::String)])
        .stripe(FixtureStripe::rows(vec![vec![FixtureValue::str("a")]]))
        .stripe(FixtureStripe::rows(vec![vec![FixtureValue::str("b")]]).without_distinct_values());
    let path = write(&dir, "nostats.strf", &file);
    let source = SourceFile::open(&path).unwrap();
    let setup = guess_setup(&source, None, &DecodeConfig::default()).unwrap();
    assert_eq!(setup.column_types(), &[ColumnType::String]);
}

#[test]
fn test_override_scenario_bad_cat_str() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();
    let config = DecodeConfig::default();

    let mut setup = guess_setup(&source, None, &config).unwrap();
    setup.set_column_type(0, ColumnType::Bad).unwrap();
    setup.set_column_type(1, ColumnType::Categorical).unwrap();
    setup.set_column_type(2, ColumnType::String).unwrap();

    let revalidated = guess_setup(&source, Some(&setup), &config).unwrap();
    assert_eq!(revalidated.errors().len(), 1);
    assert!(matches!(
        &revalidated.errors()[0],
        ParseIssue::UnsupportedTypeOverride {
            ordinal: 2,
            requested: ColumnType::String,
            kept: ColumnType::Numeric,
            reason: RejectionReason::NumericAsText,
            ..
        }
    ));
    assert_eq!(
        revalidated.column_types(),
        &[
            ColumnType::Bad,
            ColumnType::Categorical,
            ColumnType::Numeric,
            ColumnType::Numeric,
            ColumnType::Time,
        ]
    );
}

#[test]
fn test_numeric_to_categorical_is_rejected_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();
    let config = DecodeConfig::default();

    let mut setup = guess_setup(&source, None, &config).unwrap();
    setup.set_column_type(0, ColumnType::Categorical).unwrap();
    let revalidated = guess_setup(&source, Some(&setup), &config).unwrap();
    assert_eq!(revalidated.errors().len(), 1);
    assert_eq!(revalidated.column_types()[0], ColumnType::Numeric);
}

#[test]
fn test_guess_setup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();
    let config = DecodeConfig::default();

    let mut setup = guess_setup(&source, None, &config).unwrap();
    setup.set_column_type(1, ColumnType::String).unwrap();
    setup.set_column_type(2, ColumnType::Categorical).unwrap();

    let first = guess_setup(&source, Some(&setup), &config).unwrap();
    assert_eq!(first.errors().len(), 1);
    let second = guess_setup(&source, Some(&first), &config).unwrap();
    assert_eq!(second.column_types(), first.column_types());
    assert_eq!(second.column_names(), first.column_names());
    assert!(second.errors().is_empty());

    let plain = guess_setup(&source, None, &config).unwrap();
    assert_eq!(guess_setup(&source, Some(&plain), &config).unwrap(), plain);
}

#[test]
fn test_errors_follow_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();
    let config = DecodeConfig::default();

    let setup = ParseSetup::with_column_types(vec![
        ColumnType::String,
        ColumnType::Numeric,
        ColumnType::Binary,
        ColumnType::Numeric,
        ColumnType::Categorical,
    ]);
    let revalidated = guess_setup(&source, Some(&setup), &config).unwrap();
    let ordinals: Vec<usize> = revalidated.errors().iter().map(ParseIssue::ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2, 4]);
    assert_eq!(render_issues(revalidated.errors()).lines().count(), 4);
}

#[test]
fn test_prior_with_wrong_column_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.strf", &fixtures::split_elim_file());
    let source = SourceFile::open(&path).unwrap();
    let prior = ParseSetup::with_column_types(vec![ColumnType::Numeric]);
    assert!(matches!(
        guess_setup(&source, Some(&prior), &DecodeConfig::default()),
        Err(StripeError::ColumnCountMismatch {
            expected: 5,
            found: 1
        })
    ));
}

#[test]
fn test_header_only_file_gives_empty_setup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.strf");
    fixtures::write_header_only(&path).unwrap();
    let source = SourceFile::open(&path).unwrap();
    let setup = guess_setup(&source, None, &DecodeConfig::default()).unwrap();
    assert_eq!(setup.num_columns(), 0);
    assert!(setup.errors().is_empty());
}

#[test]
fn test_conflicting_stripes_fail_inference() {
    let dir = tempfile::tempdir().unwrap();
    let file = FixtureFile::new(vec![FixtureColumn::new("a", NativeKind::Int64)])
        .stripe(FixtureStripe::rows(vec![vec![FixtureValue::Int(1)]]))
        .stripe(FixtureStripe::rows(vec![vec![FixtureValue::Int(2)]]).with_column_names(vec!["z".into()]));
    let path = write(&dir, "conflict.strf", &file);
    let source = SourceFile::open(&path).unwrap();
    assert!(matches!(
        guess_setup(&source, None, &DecodeConfig::default()),
        Err(StripeError::InconsistentStripeSchema { .. })
    ));
}
