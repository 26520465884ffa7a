//! The Verification Oracle.
//!
//! - `reference`: an independent, single-threaded reader of the raw file
//! - `compare`: type-aware cell equality against a materialized dataset
//! - `report`: batch verification and the discrepancy report

pub mod compare;
pub mod reference;
pub mod report;

pub use compare::{compare, Comparison};
pub use reference::{read_reference, ReferenceRead, ReferenceValue};
pub use report::{verify_files, DiscrepancyReport, VerificationSummary};
