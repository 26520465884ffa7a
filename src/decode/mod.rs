//! The Distributed Decode Job and what it produces.
//!
//! - `stripe_decoder`: one unit's chunks -> typed pieces
//! - `domain`: local categorical domains and the global merge
//! - `dataset`: the materialized, read-only result
//! - `job`: lifecycle, parallel execution, the completion barrier

pub mod dataset;
pub mod domain;
pub mod job;
pub mod stripe_decoder;

pub use dataset::{MaterializedColumn, MaterializedDataset};
pub use job::{DecodeJob, JobId, JobStatus};
