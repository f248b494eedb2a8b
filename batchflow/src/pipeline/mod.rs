//! Job graphs and their execution.
//!
//! This module provides:
//! - Stage specifications
//! - A builder that validates names, dependencies and cycles
//! - The parallel DAG executor

mod builder;
mod dag;
mod spec;

pub use builder::PipelineBuilder;
pub use dag::{GraphExecutionResult, StageGraph};
pub use spec::StageSpec;
