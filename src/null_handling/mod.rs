//! Nullability handling for STRF column chunks.
//!
//! A chunk stores only its valid values; the optional `present` bitmap says
//! which rows they belong to. This module turns that pair back into per-row
//! options and arrow validity buffers.

pub mod bitmap;

#[cfg(any(test, feature = "fixtures"))]
pub use bitmap::pack_bits;
pub use bitmap::{scatter_valid, to_null_buffer, unpack_bits};

#[cfg(test)]
mod bitmap_tests;
