// In: src/config.rs

//! The single source of truth for all decode and verification configuration.
//!
//! `DecodeConfig` is created once at the application boundary (from code or a
//! JSON document) and passed down through the system as a shared, read-only
//! `Arc<DecodeConfig>`.

use serde::{Deserialize, Serialize};

use crate::error::StripeError;

/// Configuration for schema inference, the decode job and the oracle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DecodeConfig {
    /// A string column becomes categorical when the union of its distinct
    /// values across all stripes is strictly below this limit.
    #[serde(default = "default_categorical_cardinality_limit")]
    pub categorical_cardinality_limit: usize,

    /// Upper bound on decode worker threads. `None` uses every available core.
    #[serde(default)]
    pub max_decode_threads: Option<usize>,

    /// Stripes with more rows than this are decoded as several units, one per
    /// contiguous run of column chunks.
    #[serde(default = "default_large_stripe_rows")]
    pub large_stripe_rows: u64,

    /// How many individual cell mismatches the oracle logs per file.
    #[serde(default = "default_mismatch_log_limit")]
    pub mismatch_log_limit: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            categorical_cardinality_limit: default_categorical_cardinality_limit(),
            max_decode_threads: None,
            large_stripe_rows: default_large_stripe_rows(),
            mismatch_log_limit: default_mismatch_log_limit(),
        }
    }
}

impl DecodeConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, StripeError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn default_categorical_cardinality_limit() -> usize {
    10_000
}

fn default_large_stripe_rows() -> u64 {
    1_000_000
}

fn default_mismatch_log_limit() -> usize {
    10
}
