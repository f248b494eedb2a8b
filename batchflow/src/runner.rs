//! Runs a job graph to completion.
//!
//! [`PipelineRunner`] owns the graph and the run identity. It blocks until
//! every stage has finished (or one has failed) and folds the stage outputs
//! into a [`PipelineResult`].

use crate::context::{ExecutionContext, PipelineContext, RunIdentity};
use crate::core::{StageKind, StageOutput, ERROR_DETAIL_KEY};
use crate::errors::BatchflowError;
use crate::events::{EventSink, LoggingEventSink};
use crate::pipeline::StageGraph;
use crate::warehouse::{TableReference, WriteResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Key under which load stages publish their [`LoadSummary`].
pub const LOAD_SUMMARY_KEY: &str = "load_summary";

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Every stage finished.
    Done,
    /// A stage failed and the run stopped.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// What the load stages of a run achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Destinations whose contents were committed.
    pub successful_loads: Vec<TableReference>,
    /// Rows the sink refused.
    pub failed_inserts: u64,
    /// Rows written.
    pub rows_written: u64,
}

impl LoadSummary {
    /// Adds another summary to this one.
    pub fn merge(&mut self, other: LoadSummary) {
        self.successful_loads.extend(other.successful_loads);
        self.failed_inserts += other.failed_inserts;
        self.rows_written += other.rows_written;
    }
}

impl From<&WriteResult> for LoadSummary {
    fn from(result: &WriteResult) -> Self {
        Self {
            successful_loads: result.successful_loads.clone(),
            failed_inserts: result.failed_insert_count(),
            rows_written: result.rows_written,
        }
    }
}

/// The stage that stopped a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// Error category reported by the stage.
    pub kind: Option<String>,
    /// Error message.
    pub message: String,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Terminal state.
    pub state: PipelineState,
    /// Outputs of the stages that finished.
    pub outputs: HashMap<String, StageOutput>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Combined load results.
    pub load: LoadSummary,
    /// The failing stage, when `state` is `Failed`.
    pub failure: Option<StageFailure>,
}

impl PipelineResult {
    /// Returns true if the run finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// The fatal error behind a failed run.
    #[must_use]
    pub fn error(&self) -> Option<BatchflowError> {
        let failure = self.failure.as_ref()?;
        let detail = self
            .outputs
            .get(&failure.stage)
            .and_then(|output| output.metadata.get(ERROR_DETAIL_KEY));
        Some(BatchflowError::from_stage_failure(
            &failure.stage,
            failure.kind.as_deref(),
            &failure.message,
            detail,
        ))
    }

    /// Converts a failed run into its fatal error.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing stage when the run failed.
    pub fn into_result(self) -> Result<Self, BatchflowError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Executes a [`StageGraph`] for one run.
pub struct PipelineRunner {
    graph: StageGraph,
    identity: RunIdentity,
    event_sink: Arc<dyn EventSink>,
}

impl fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("graph", &self.graph.name())
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Creates a runner whose events go to the log.
    #[must_use]
    pub fn new(graph: StageGraph, identity: RunIdentity) -> Self {
        Self {
            graph,
            identity,
            event_sink: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Runs the graph and waits for it to finish.
    ///
    /// A failed stage yields a result in the `Failed` state.
    ///
    /// # Errors
    ///
    /// Returns an error only when the executor itself breaks.
    pub async fn execute(&self) -> Result<PipelineResult, BatchflowError> {
        let ctx = Arc::new(
            PipelineContext::new(self.identity.clone()).with_event_sink(self.event_sink.clone()),
        );

        info!(
            job = %self.identity.job,
            run_id = %self.identity.run_id,
            runner = %self.identity.runner,
            stages = self.graph.stage_count(),
            "pipeline started"
        );
        ctx.try_emit_event(
            "pipeline.started",
            Some(serde_json::json!({
                "stages": self.graph.execution_order(),
                "started_at": self.identity.started_at_rfc3339(),
            })),
        );

        let graph_result = self.graph.execute(ctx.clone()).await?;

        let mut load = LoadSummary::default();
        for name in self.graph.execution_order() {
            let is_load = self
                .graph
                .stage(name)
                .is_some_and(|spec| spec.kind == StageKind::Load);
            let summary = graph_result
                .outputs
                .get(name)
                .filter(|_| is_load)
                .map(|output| output.get_as::<LoadSummary>(LOAD_SUMMARY_KEY))
                .transpose()?
                .flatten();
            if let Some(summary) = summary {
                load.merge(summary);
            }
        }

        let failure = graph_result.failed_stage.as_ref().map(|stage| {
            let output = graph_result.outputs.get(stage);
            StageFailure {
                stage: stage.clone(),
                kind: output.and_then(|o| o.error_kind.clone()),
                message: output
                    .and_then(|o| o.error.clone())
                    .or_else(|| graph_result.error.clone())
                    .unwrap_or_default(),
            }
        });

        let state = if graph_result.success {
            PipelineState::Done
        } else {
            PipelineState::Failed
        };

        match &failure {
            Some(failure) => {
                error!(
                    job = %self.identity.job,
                    stage = %failure.stage,
                    error = %failure.message,
                    "pipeline failed"
                );
                ctx.try_emit_event(
                    "pipeline.failed",
                    Some(serde_json::json!({
                        "stage": failure.stage,
                        "error": failure.message,
                        "duration_ms": graph_result.duration_ms,
                    })),
                );
            }
            None => {
                info!(
                    job = %self.identity.job,
                    state = %state,
                    duration_ms = graph_result.duration_ms,
                    successful_loads = load.successful_loads.len(),
                    failed_inserts = load.failed_inserts,
                    rows_written = load.rows_written,
                    "pipeline finished"
                );
                ctx.try_emit_event(
                    "pipeline.completed",
                    Some(serde_json::json!({
                        "duration_ms": graph_result.duration_ms,
                        "load": &load,
                    })),
                );
            }
        }

        Ok(PipelineResult {
            state,
            outputs: graph_result.outputs,
            duration_ms: graph_result.duration_ms,
            load,
            failure,
        })
    }

    /// Runs the graph and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the fatal error of the failing stage, or an executor error.
    pub async fn run(&self) -> Result<PipelineResult, BatchflowError> {
        self.execute().await?.into_result()
    }
}
