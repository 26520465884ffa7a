//! Schema inference, type override validation and parse setups.

pub mod inference;
pub mod setup;
pub mod validator;

pub use inference::guess_setup;
pub use setup::{render_issues, FrozenSetup, ParseIssue, ParseSetup, PARSE_TYPE};
pub use validator::{validate, RejectionReason};

#[cfg(test)]
mod inference_tests;
