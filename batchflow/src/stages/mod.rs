//! Stage trait and implementations.
//!
//! Stages are the units of work in a job graph. A stage reads the outputs of
//! the stages it depends on from its [`StageContext`] and publishes its own
//! through the returned [`StageOutput`].

use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use crate::errors::BatchflowError;
use async_trait::async_trait;
use std::fmt::Debug;

/// A unit of work in a job graph.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the role of the stage.
    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    /// Executes the stage.
    ///
    /// Failures are reported through the output status, never by panicking.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// A stage backed by a synchronous function.
///
/// An `Err` from the function becomes a failed output carrying the error's
/// category.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, BatchflowError> + Send + Sync,
{
    name: String,
    kind: StageKind,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, BatchflowError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Transform,
            func,
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, BatchflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, BatchflowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        (self.func)(ctx).unwrap_or_else(|err| StageOutput::from_error(&err))
    }
}

/// A stage that does nothing.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineContext, RunIdentity, StageInputs};
    use crate::errors::SchemaError;
    use std::sync::Arc;

    fn test_stage_context() -> StageContext {
        let pipeline_ctx = Arc::new(PipelineContext::new(RunIdentity::new("test")));
        StageContext::new(pipeline_ctx, "test", StageInputs::default())
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("test", |_ctx| {
            Ok(StageOutput::ok_value("result", serde_json::json!("done")))
        })
        .with_kind(StageKind::Aggregate);

        assert_eq!(stage.name(), "test");
        assert_eq!(stage.kind(), StageKind::Aggregate);

        let output = stage.execute(&test_stage_context()).await;
        assert!(output.is_success());
        assert_eq!(output.get("result"), Some(&serde_json::json!("done")));
    }

    #[tokio::test]
    async fn test_fn_stage_error_becomes_failure() {
        let stage = FnStage::new("decode", |_ctx| Err(SchemaError::missing("month").into()));

        let output = stage.execute(&test_stage_context()).await;
        assert!(output.is_failure());
        assert_eq!(output.error_kind.as_deref(), Some("schema"));
        assert!(output.error.unwrap().contains("month"));
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");

        assert_eq!(stage.name(), "noop");
        assert_eq!(stage.kind(), StageKind::Transform);
        assert!(stage.execute(&test_stage_context()).await.is_success());
    }
}
