//! This file is the root of the `stripefile` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`format`, `schema`,
//!     `decode`, `verify`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the handful of types a caller needs to open a file, settle
//!     its column types, run a decode job and verify the result.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod config;
pub mod decode;
pub mod error;
pub mod format;
pub mod kernels;
pub mod schema;
pub mod types;
pub mod verify;

mod null_handling;
mod traits;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

//==================================================================================
// 2. Public API
//==================================================================================
pub use config::DecodeConfig;
pub use decode::{DecodeJob, JobStatus, MaterializedColumn, MaterializedDataset};
pub use error::StripeError;
pub use format::{ColumnDescriptor, FileMetadata, SourceFile};
pub use observability::init_logging;
pub use schema::{guess_setup, render_issues, validate, FrozenSetup, ParseIssue, ParseSetup};
pub use types::{ColumnType, NativeKind};
pub use verify::{compare, verify_files, Comparison, DiscrepancyReport};
