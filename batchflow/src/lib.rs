//! # Batchflow
//!
//! Batch extract-transform-load jobs on a parallel stage graph.
//!
//! A job is a [`pipeline::StageGraph`]: named stages with declared
//! dependencies that exchange JSON-encoded data. Independent stages run
//! concurrently on tokio tasks, and data-parallel work inside a stage is
//! spread over [`transforms::Partitioned`] collections.
//!
//! Jobs talk to warehouses through two traits:
//!
//! - [`warehouse::QuerySource`]: runs a query and streams rows
//! - [`warehouse::TableSink`]: writes rows with write/create dispositions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batchflow::prelude::*;
//! use batchflow::jobs::tornadoes;
//! use std::sync::Arc;
//!
//! let config = PipelineOptions::default()
//!     .with_output("my-project:weather.tornadoes")
//!     .validate()?;
//! let warehouse = Arc::new(LocalWarehouse::new("warehouse"));
//!
//! let result = tornadoes::run(&config, warehouse.clone(), warehouse, None).await?;
//! assert_eq!(result.state, PipelineState::Done);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod pipeline;
pub mod records;
pub mod runner;
pub mod stages;
pub mod transforms;
pub mod warehouse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{JobConfig, PipelineOptions, RunnerKind};
    pub use crate::context::{
        ExecutionContext, PipelineContext, RunIdentity, StageContext, StageInputs,
    };
    pub use crate::core::{StageKind, StageOutput, StageStatus};
    pub use crate::errors::{
        BatchflowError, ConfigError, ExtractError, LoadError, PipelineValidationError,
        SchemaError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{PipelineBuilder, StageGraph, StageSpec};
    pub use crate::records::{FromRow, Record, TableRow, TableSchema, ToRow};
    pub use crate::runner::{LoadSummary, PipelineResult, PipelineRunner, PipelineState};
    pub use crate::stages::{FnStage, Stage};
    pub use crate::transforms::{count_by_value, Partitioned};
    pub use crate::warehouse::{
        CreateDisposition, InMemoryWarehouse, LoadRequest, LocalWarehouse, QuerySource,
        TableReference, TableSink, WriteDisposition, WriteResult,
    };
}
