//! Execution contexts.
//!
//! - [`RunIdentity`] correlates everything a run emits
//! - [`PipelineContext`] is shared by every stage of a run
//! - [`StageContext`] adds the stage name and its [`StageInputs`]

#[cfg(test)]
mod context_tests;
mod execution;
mod identity;
mod inputs;

pub use execution::{ExecutionContext, PipelineContext, StageContext};
pub use identity::RunIdentity;
pub use inputs::{StageData, StageInputs};
