//! This module defines the core, strongly-typed data representations used
//! throughout the stripefile reader.
//!
//! Two closed enums carry all type reasoning:
//! - [`NativeKind`]: how a column is physically encoded on disk.
//! - [`ColumnType`]: what a column becomes once it is materialized.
//!
//! Every mapping between them is a total `match`, so the compatibility matrix
//! stays exhaustively testable.

pub mod column_type;
pub mod native_kind;

// Re-export the main type(s) for easier access.
pub use column_type::ColumnType;
pub use native_kind::NativeKind;
