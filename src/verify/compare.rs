//! Cell-by-cell comparison of a materialized dataset against the reference path.

use std::path::Path;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Int32Type, Int64Type, Float64Type, TimestampMillisecondType};

use crate::config::DecodeConfig;
use crate::decode::{MaterializedColumn, MaterializedDataset};
use crate::error::StripeError;
use crate::verify::reference::{read_reference, ReferenceRead, ReferenceValue};

/// The outcome of comparing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub mismatches: u64,
    /// `false` when the reference path could not describe the file; such a
    /// file contributes no mismatches.
    pub usable: bool,
}

impl Comparison {
    fn unusable() -> Self {
        Self {
            mismatches: 0,
            usable: false,
        }
    }
}

/// Compares `dataset` with an independent reference read of `path`.
///
/// A row or column count disagreement counts as one mismatch and stops the
/// comparison. Bad columns are skipped. The dataset is only read.
pub fn compare(
    path: &Path,
    dataset: &MaterializedDataset,
    config: &DecodeConfig,
) -> Result<Comparison, StripeError> {
    let table = match read_reference(path)? {
        ReferenceRead::Usable(table) => table,
        ReferenceRead::Unusable(reason) => {
            log::info!("{} is not usable as a reference: {}", path.display(), reason);
            return Ok(Comparison::unusable());
        }
    };

    if table.num_rows != dataset.num_rows() || table.columns.len() != dataset.num_columns() {
        log::warn!(
            "{}: dataset is {} x {}, reference is {} x {}",
            path.display(),
            dataset.num_rows(),
            dataset.num_columns(),
            table.num_rows,
            table.columns.len()
        );
        return Ok(Comparison {
            mismatches: 1,
            usable: true,
        });
    }

    let mut mismatches = 0u64;
    let mut logged = 0usize;
    for (expected, column) in table.columns.iter().zip(dataset.columns()) {
        if expected.name != column.name() {
            log::warn!(
                "{}: column '{}' found where '{}' was expected",
                path.display(),
                column.name(),
                expected.name
            );
            mismatches += 1;
            continue;
        }
        if column.is_bad() {
            continue;
        }

        let Some(actual) = cells(column) else {
            log::warn!(
                "{}: column '{}' has unexpected type {}",
                path.display(),
                column.name(),
                column.array().data_type()
            );
            mismatches += expected.values.len() as u64;
            continue;
        };
        for (row, (want, got)) in expected.values.iter().zip(&actual).enumerate() {
            if cells_equal(want, got) {
                continue;
            }
            mismatches += 1;
            if logged < config.mismatch_log_limit {
                logged += 1;
                log::warn!(
                    "{}: column '{}' row {}: expected {:?}, got {:?}",
                    path.display(),
                    column.name(),
                    row,
                    want,
                    got
                );
            }
        }
    }

    log_metric!(
        "event" = "compare",
        "file" = &path.display(),
        "rows" = &table.num_rows,
        "mismatches" = &mismatches
    );
    Ok(Comparison {
        mismatches,
        usable: true,
    })
}

/// Equality with a NaN sentinel: NaN equals NaN, missing equals only missing.
pub(crate) fn cells_equal(expected: &ReferenceValue, actual: &ReferenceValue) -> bool {
    match (expected, actual) {
        (ReferenceValue::Float(a), ReferenceValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
        (a, b) => a == b,
    }
}

/// Reads every cell of a dataset column into reference form. Categorical
/// codes are resolved through the column's global domain.
fn cells(column: &MaterializedColumn) -> Option<Vec<ReferenceValue>> {
    let array = column.array();
    let cell = |row: usize, value: ReferenceValue| {
        if array.is_null(row) {
            ReferenceValue::Missing
        } else {
            value
        }
    };

    let values = match array.data_type() {
        DataType::Int64 => {
            let ints = array.as_primitive_opt::<Int64Type>()?;
            (0..ints.len()).map(|r| cell(r, ReferenceValue::Int(ints.value(r)))).collect()
        }
        DataType::Float64 => {
            let floats = array.as_primitive_opt::<Float64Type>()?;
            (0..floats.len())
                .map(|r| cell(r, ReferenceValue::Float(floats.value(r))))
                .collect()
        }
        DataType::Timestamp(_, _) => {
            let ts = array.as_primitive_opt::<TimestampMillisecondType>()?;
            (0..ts.len()).map(|r| cell(r, ReferenceValue::Int(ts.value(r)))).collect()
        }
        DataType::Utf8 => {
            let strings = array.as_string_opt::<i32>()?;
            (0..strings.len())
                .map(|r| cell(r, ReferenceValue::Text(strings.value(r).to_string())))
                .collect()
        }
        DataType::Binary => {
            let bytes = array.as_binary_opt::<i32>()?;
            (0..bytes.len())
                .map(|r| cell(r, ReferenceValue::Bytes(bytes.value(r).to_vec())))
                .collect()
        }
        DataType::Dictionary(_, _) => {
            let domain = column.domain()?;
            let keys = array.as_dictionary_opt::<Int32Type>()?.keys();
            keys.iter()
                .map(|key| match key {
                    None => Some(ReferenceValue::Missing),
                    Some(code) => usize::try_from(code)
                        .ok()
                        .and_then(|code| domain.get(code))
                        .map(|value| ReferenceValue::Text(value.clone())),
                })
                .collect::<Option<Vec<_>>>()?
        }
        _ => return None,
    };
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeJob;
    use crate::fixtures::{self, FixtureColumn, FixtureFile, FixtureStripe, FixtureValue};
    use crate::format::SourceFile;
    use crate::schema::guess_setup;
    use crate::types::{ColumnType, NativeKind};
    use std::sync::Arc;

    fn decode(path: &Path) -> Arc<MaterializedDataset> {
        let source = Arc::new(SourceFile::open(path).unwrap());
        let setup = guess_setup(&source, None, &DecodeConfig::default()).unwrap();
        DecodeJob::submit(source, &setup, Arc::new(DecodeConfig::default()))
            .unwrap()
            .wait()
            .unwrap()
    }

    fn int_file(values: &[i64]) -> FixtureFile {
        FixtureFile::new(vec![
            FixtureColumn::new("a", NativeKind::Int64),
            FixtureColumn::new("s", NativeKind::String),
        ])
        .stripe(FixtureStripe::rows(
            values
                .iter()
                .map(|&v| vec![FixtureValue::Int(v), FixtureValue::str("x")])
                .collect(),
        ))
    }

    #[test]
    fn test_self_comparison_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.strf");
        fixtures::split_elim_file().write_to(&path).unwrap();

        let dataset = decode(&path);
        let comparison = compare(&path, &dataset, &DecodeConfig::default()).unwrap();
        assert_eq!(
            comparison,
            Comparison {
                mismatches: 0,
                usable: true
            }
        );
    }

    #[test]
    fn test_bad_columns_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.strf");
        fixtures::split_elim_file().write_to(&path).unwrap();

        let source = Arc::new(SourceFile::open(&path).unwrap());
        let mut setup = guess_setup(&source, None, &DecodeConfig::default()).unwrap();
        setup.set_column_type(0, ColumnType::Bad).unwrap();
        setup.set_column_type(1, ColumnType::String).unwrap();
        let dataset = DecodeJob::submit(source, &setup, Arc::new(DecodeConfig::default()))
            .unwrap()
            .wait()
            .unwrap();
        let comparison = compare(&path, &dataset, &DecodeConfig::default()).unwrap();
        assert_eq!(comparison.mismatches, 0);
    }

    #[test]
    fn test_differing_cells_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a.strf");
        let altered = dir.path().join("b.strf");
        int_file(&[1, 2, 3]).write_to(&original).unwrap();
        int_file(&[1, 5, 6]).write_to(&altered).unwrap();

        let dataset = decode(&original);
        let comparison = compare(&altered, &dataset, &DecodeConfig::default()).unwrap();
        assert_eq!(comparison.mismatches, 2);
        assert!(comparison.usable);

        let shorter = dir.path().join("c.strf");
        int_file(&[1, 2]).write_to(&shorter).unwrap();
        assert_eq!(
            compare(&shorter, &dataset, &DecodeConfig::default())
                .unwrap()
                .mismatches,
            1
        );
    }

    #[test]
    fn test_truncated_copy_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.strf");
        fixtures::split_elim_file().write_to(&path).unwrap();
        let dataset = decode(&path);

        let bytes = std::fs::read(&path).unwrap();
        let truncated = dir.path().join("truncated.strf");
        std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();

        let comparison = compare(&truncated, &dataset, &DecodeConfig::default()).unwrap();
        assert_eq!(comparison, Comparison::unusable());
    }

    #[test]
    fn test_schema_without_rows_compares_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_rows.strf");
        FixtureFile::new(vec![
            FixtureColumn::new("a", NativeKind::Int64),
            FixtureColumn::new("s", NativeKind::String),
        ])
        .write_to(&path)
        .unwrap();

        let dataset = decode(&path);
        assert_eq!(dataset.num_rows(), 0);
        let comparison = compare(&path, &dataset, &DecodeConfig::default()).unwrap();
        assert_eq!(
            comparison,
            Comparison {
                mismatches: 0,
                usable: true
            }
        );
    }

    #[test]
    fn test_high_scale_decimals_compare_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decimals.strf");
        FixtureFile::new(vec![FixtureColumn::new(
            "d",
            NativeKind::Decimal {
                precision: 38,
                scale: 25,
            },
        )])
        .stripe(FixtureStripe::rows(
            (1..200).map(|v| vec![FixtureValue::Int(v * 7919)]).collect(),
        ))
        .stripe(FixtureStripe::rows(vec![
            vec![FixtureValue::Int(9_007_199_254_740_993)],
            vec![FixtureValue::Int(-4_611_686_018_427_387_903)],
        ]))
        .write_to(&path)
        .unwrap();

        let dataset = decode(&path);
        let comparison = compare(&path, &dataset, &DecodeConfig::default()).unwrap();
        assert_eq!(
            comparison,
            Comparison {
                mismatches: 0,
                usable: true
            }
        );
    }

    #[test]
    fn test_nan_and_missing_equality() {
        let nan = ReferenceValue::Float(f64::NAN);
        assert!(cells_equal(&nan, &nan));
        assert!(!cells_equal(&nan, &ReferenceValue::Missing));
        assert!(cells_equal(&ReferenceValue::Missing, &ReferenceValue::Missing));
        assert!(!cells_equal(&ReferenceValue::Int(0), &ReferenceValue::Missing));
        assert!(!cells_equal(&ReferenceValue::Int(1), &ReferenceValue::Float(1.0)));
    }
}
