//! Contexts handed to the executor and to each stage.

use super::{RunIdentity, StageInputs};
use crate::events::{EventSink, LoggingEventSink};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Behaviour shared by pipeline and stage contexts.
pub trait ExecutionContext: Send + Sync {
    /// Returns the run id.
    fn run_id(&self) -> Uuid;

    /// Returns the job name.
    fn job(&self) -> &str;

    /// Emits an event, enriched with the run's correlation fields.
    fn try_emit_event(&self, event_type: &str, data: Option<Value>);
}

fn into_object(data: Option<Value>) -> Map<String, Value> {
    match data {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
        None => Map::new(),
    }
}

/// The context of one job execution.
pub struct PipelineContext {
    identity: RunIdentity,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    /// Creates a context that logs its events.
    #[must_use]
    pub fn new(identity: RunIdentity) -> Self {
        Self {
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

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }
}

impl ExecutionContext for PipelineContext {
    fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    fn job(&self) -> &str {
        &self.identity.job
    }

    fn try_emit_event(&self, event_type: &str, data: Option<Value>) {
        let mut payload = into_object(data);
        self.identity.enrich(&mut payload);
        self.event_sink.try_emit(event_type, Some(Value::Object(payload)));
    }
}

/// The context for a single stage execution.
#[derive(Debug)]
pub struct StageContext {
    pipeline_ctx: Arc<PipelineContext>,
    stage_name: String,
    inputs: StageInputs,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(pipeline_ctx: Arc<PipelineContext>, stage_name: impl Into<String>, inputs: StageInputs) -> Self {
        Self {
            pipeline_ctx,
            stage_name: stage_name.into(),
            inputs,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the stage inputs.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// Returns the pipeline context.
    #[must_use]
    pub fn pipeline_ctx(&self) -> &Arc<PipelineContext> {
        &self.pipeline_ctx
    }
}

impl ExecutionContext for StageContext {
    fn run_id(&self) -> Uuid {
        self.pipeline_ctx.run_id()
    }

    fn job(&self) -> &str {
        self.pipeline_ctx.job()
    }

    fn try_emit_event(&self, event_type: &str, data: Option<Value>) {
        let mut payload = into_object(data);
        payload.insert("stage".to_string(), json!(&self.stage_name));
        self.pipeline_ctx.try_emit_event(event_type, Some(Value::Object(payload)));
    }
}
