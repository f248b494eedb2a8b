//! Core domain model types for batchflow.
//!
//! This module contains the fundamental types used throughout the runner:
//! - Stage status and kind enums
//! - Stage output type with factory methods

mod output;
#[cfg(test)]
mod output_tests;
mod status;

pub use output::{StageOutput, ERROR_DETAIL_KEY};
pub use status::{StageKind, StageStatus};
