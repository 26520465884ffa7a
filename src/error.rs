// In: src/error.rs

//! This module defines the single, unified error type for the entire stripefile library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Rejected type overrides are deliberately *not* part of this enum: they are
//! collected as [`crate::schema::ParseIssue`] records and never abort anything.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StripeError {
    // =========================================================================
    // === File-Level Errors (fatal for the file)
    // =========================================================================
    #[error("Corrupt file {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    /// The file carries a valid header but no footer and no data. Callers treat
    /// this as a valid zero-row, zero-column result.
    #[error("File {0} contains a header but no data")]
    EmptyFile(PathBuf),

    #[error("Inconsistent stripe schema in {path}: stripe {stripe} declares columns {found:?}, file schema has {expected:?}")]
    InconsistentStripeSchema {
        path: PathBuf,
        stripe: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File {path} is unreadable: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // === Configuration Errors
    // =========================================================================
    #[error("Parse setup has {found} column types, but the file has {expected} columns")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("Column index {index} is out of range for a setup with {len} columns")]
    ColumnIndexOutOfRange { index: usize, len: usize },

    // =========================================================================
    // === Decode Job Errors
    // =========================================================================
    #[error("Stripe {stripe} failed to decode: {source}")]
    StripeDecode {
        stripe: usize,
        #[source]
        source: Box<StripeError>,
    },

    #[error("Column chunk format error: {0}")]
    ChunkFormatError(String),

    #[error("Decode job {0} was cancelled")]
    Cancelled(String),

    /// Returned by `wait` after the job's original error was already handed out.
    #[error("Decode job {job} failed: {message}")]
    JobFailed { job: String, message: String },

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically during footer or config parsing.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error from a safe byte-casting operation failing.
    #[error("Byte slice casting error: {0}")]
    PodCast(String), // Manual `From` impl is needed as bytemuck::PodCastError doesn't impl Error

    // =========================================================================
    // === Low-Level Kernel Errors
    // =========================================================================
    #[error("Zstd operation failed: {0}")]
    ZstdError(String),

    #[error("LEB128 decoding error: {0}")]
    Leb128DecodeError(String),

    #[error("Bitmap decoding failed: expected at least {expected} bits, got {actual}")]
    BitmapDecodeError { expected: usize, actual: usize },
}

impl StripeError {
    /// Wraps any error raised while decoding a stripe so the job can report
    /// which unit failed.
    pub(crate) fn in_stripe(self, stripe: usize) -> Self {
        match self {
            already @ StripeError::StripeDecode { .. } => already,
            other => StripeError::StripeDecode {
                stripe,
                source: Box::new(other),
            },
        }
    }

    /// Maps an `open`/`read` failure for `path` onto the caller-facing taxonomy.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => StripeError::FileNotFound(path),
            _ => StripeError::FileUnreadable { path, source: err },
        }
    }

    /// `true` for failures that come from the filesystem rather than the bytes.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            StripeError::FileNotFound(_) | StripeError::FileUnreadable { .. } | StripeError::Io(_)
        )
    }
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<bytemuck::PodCastError> for StripeError {
    fn from(err: bytemuck::PodCastError) -> Self {
        StripeError::PodCast(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StripeError>;
