//! Batch verification over a caller-supplied list of files.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use crate::config::DecodeConfig;
use crate::decode::DecodeJob;
use crate::error::StripeError;
use crate::format::SourceFile;
use crate::schema::guess_setup;
use crate::verify::compare::compare;
use crate::verify::reference::read_reference;

/// Failed file identifiers plus the total mismatched cell count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscrepancyReport {
    failed_files: BTreeSet<String>,
    mismatch_count: u64,
    unusable_files: BTreeSet<String>,
    files_tested: usize,
}

impl DiscrepancyReport {
    pub fn failed_files(&self) -> &BTreeSet<String> {
        &self.failed_files
    }

    pub fn mismatch_count(&self) -> u64 {
        self.mismatch_count
    }

    /// Files the reference path could not describe. They are not failures.
    pub fn unusable_files(&self) -> &BTreeSet<String> {
        &self.unusable_files
    }

    pub fn files_tested(&self) -> usize {
        self.files_tested
    }

    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }

    pub fn summary(&self) -> VerificationSummary<'_> {
        VerificationSummary { report: self }
    }

    fn record_failure(&mut self, file: &str, mismatches: u64) {
        self.failed_files.insert(file.to_string());
        self.mismatch_count += mismatches;
    }

    fn record_unusable(&mut self, file: &str) {
        self.unusable_files.insert(file.to_string());
    }
}

/// Decodes and verifies every file in `paths`, in order.
///
/// Each file runs through `guess_setup`, a decode job and [`compare`].
/// Filesystem failures count one mismatch and fail the file. A file that the
/// decoder rejects is checked against the reference path: if that cannot read it
/// either, it is recorded as unusable, otherwise it fails.
pub fn verify_files<P: AsRef<Path>>(paths: &[P], config: Arc<DecodeConfig>) -> DiscrepancyReport {
    let mut report = DiscrepancyReport::default();
    for path in paths {
        let path = path.as_ref();
        let file = path.display().to_string();
        report.files_tested += 1;

        match verify_one(path, &config) {
            Ok(Some(0)) => log::info!("{} verified", file),
            Ok(Some(mismatches)) => {
                log::warn!("{} has {} mismatched cells", file, mismatches);
                report.record_failure(&file, mismatches);
            }
            Ok(None) => report.record_unusable(&file),
            Err(e) if e.is_io() => {
                log::error!("{} could not be read: {}", file, e);
                report.record_failure(&file, 1);
            }
            Err(e) => match read_reference(path) {
                Ok(reference) if !reference.is_usable() => {
                    log::info!("{} rejected by both decoders: {}", file, e);
                    report.record_unusable(&file);
                }
                _ => {
                    log::error!("{} failed to decode: {}", file, e);
                    report.record_failure(&file, 1);
                }
            },
        }
    }
    log_metric!(
        "event" = "verify_files",
        "files" = &report.files_tested,
        "failed" = &report.failed_files.len(),
        "mismatches" = &report.mismatch_count
    );
    report
}

/// `Some(mismatches)` for a usable file, `None` for an unusable one.
fn verify_one(path: &Path, config: &Arc<DecodeConfig>) -> Result<Option<u64>, StripeError> {
    if !path.exists() {
        return Err(StripeError::FileNotFound(path.to_path_buf()));
    }
    let source = Arc::new(SourceFile::open(path)?);
    let setup = guess_setup(&source, None, config)?;
    let job = DecodeJob::submit(source, &setup, Arc::clone(config))?;
    let dataset = job.wait()?;
    let comparison = compare(path, &dataset, config)?;
    Ok(comparison.usable.then_some(comparison.mismatches))
}

/// Renders a report as a pass/fail summary.
pub struct VerificationSummary<'a> {
    report: &'a DiscrepancyReport,
}

impl fmt::Display for VerificationSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        if report.passed() {
            write!(f, "{}", "PASS".green().bold())?;
        } else {
            write!(f, "{}", "FAIL".red().bold())?;
        }
        write!(
            f,
            ": {} files tested, {} mismatched cells",
            report.files_tested, report.mismatch_count
        )?;
        if !report.unusable_files.is_empty() {
            write!(f, ", {} unusable", report.unusable_files.len())?;
        }
        for file in &report.failed_files {
            write!(f, "\n  {} {}", "failed:".red(), file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_clean_files_pass() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.strf");
        let b = dir.path().join("b.strf");
        fixtures::split_elim_file().write_to(&a).unwrap();
        fixtures::split_elim_file().write_to(&b).unwrap();

        let report = verify_files(&[&a, &b], Arc::new(DecodeConfig::default()));
        assert!(report.passed());
        assert_eq!(report.files_tested(), 2);
        assert!(report.failed_files().is_empty());
    }

    #[test]
    fn test_missing_and_unusable_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.strf");
        let missing = dir.path().join("missing.strf");
        let empty = dir.path().join("empty.strf");
        let truncated = dir.path().join("truncated.strf");
        fixtures::split_elim_file().write_to(&good).unwrap();
        fixtures::write_header_only(&empty).unwrap();
        let bytes = std::fs::read(&good).unwrap();
        std::fs::write(&truncated, &bytes[..bytes.len() - 5]).unwrap();

        let report = verify_files(
            &[&good, &missing, &empty, &truncated],
            Arc::new(DecodeConfig::default()),
        );
        assert_eq!(report.files_tested(), 4);
        assert_eq!(report.mismatch_count(), 1);
        assert_eq!(
            report.failed_files().iter().collect::<Vec<_>>(),
            vec![&missing.display().to_string()]
        );
        assert!(report.unusable_files().contains(&empty.display().to_string()));
        assert!(report.unusable_files().contains(&truncated.display().to_string()));
        assert!(!report.passed());
    }

    #[test]
    fn test_file_without_rows_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_rows.strf");
        fixtures::FixtureFile::new(vec![fixtures::FixtureColumn::new(
            "a",
            crate::types::NativeKind::Int64,
        )])
        .write_to(&path)
        .unwrap();

        let report = verify_files(&[&path], Arc::new(DecodeConfig::default()));
        assert!(report.passed());
        assert!(report.failed_files().is_empty());
        assert!(report.unusable_files().is_empty());
    }

    #[test]
    fn test_summary_lists_failed_files() {
        colored::control::set_override(false);
        let mut report = DiscrepancyReport::default();
        report.files_tested = 3;
        report.record_failure("b.strf", 2);
        report.record_failure("a.strf", 1);
        assert_eq!(
            report.summary().to_string(),
            "FAIL: 3 files tested, 3 mismatched cells\n  failed: a.strf\n  failed: b.strf"
        );

        let clean = DiscrepancyReport {
            files_tested: 1,
            ..Default::default()
        };
        assert_eq!(clean.summary().to_string(), "PASS: 1 files tested, 0 mismatched cells");
    }
}
