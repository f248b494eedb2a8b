//! StageGraph DAG execution engine.
//!
//! Executes stages as soon as their dependencies are met, allowing for
//! maximum parallelism.

use super::StageSpec;
use crate::context::{ExecutionContext, PipelineContext, StageContext, StageData, StageInputs};
use crate::core::{StageOutput, StageStatus};
use crate::errors::BatchflowError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

type StageTask = JoinHandle<(String, StageOutput)>;

/// Result of executing a stage graph.
#[derive(Debug)]
pub struct GraphExecutionResult {
    /// Per-stage outputs of the stages that finished.
    pub outputs: HashMap<String, StageOutput>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// Whether every stage finished without failing.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Name of the stage that failed, if any.
    pub failed_stage: Option<String>,
}

/// A directed acyclic graph of stages.
#[derive(Debug)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageSpec>,
    execution_order: Vec<String>,
}

impl StageGraph {
    /// Creates a new stage graph.
    ///
    /// `stage_order` is the insertion order; it makes the topological order
    /// deterministic.
    #[must_use]
    pub fn new(name: String, stages: HashMap<String, StageSpec>, stage_order: Vec<String>) -> Self {
        let execution_order = topological_sort(&stages, &stage_order);

        Self {
            name,
            stages,
            execution_order,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns a stage specification.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// Executes the graph.
    ///
    /// Independent stages run concurrently on tokio tasks. The first failed
    /// stage stops the run: stages still in flight are aborted and nothing
    /// new is scheduled.
    ///
    /// Each stage receives only the data of its declared dependencies. Once
    /// the last consumer of an extract, transform or aggregate stage has
    /// started, that stage's data is dropped, so its entry in the result
    /// carries status but no data. Load, inspect and leaf stages keep theirs.
    ///
    /// # Errors
    ///
    /// Returns an error only when the executor itself breaks (a stage task
    /// panicked, or the graph cannot make progress). Stage failures are
    /// reported in the returned result.
    pub async fn execute(&self, ctx: Arc<PipelineContext>) -> Result<GraphExecutionResult, BatchflowError> {
        let start = Instant::now();

        let mut outputs: HashMap<String, StageOutput> = HashMap::new();
        let mut completed: HashMap<String, StageData> = HashMap::new();

        let mut in_degree: HashMap<&str, usize> = self
            .stages
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.dependencies.len()))
            .collect();
        let mut pending_consumers: HashMap<&str, usize> =
            self.stages.keys().map(|name| (name.as_str(), 0)).collect();
        for spec in self.stages.values() {
            for dep in &spec.dependencies {
                if let Some(count) = pending_consumers.get_mut(dep.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut active: FuturesUnordered<StageTask> = FuturesUnordered::new();
        for name in &self.execution_order {
            if in_degree.get(name.as_str()) == Some(&0) {
                active.push(self.spawn_stage_task(name, ctx.clone(), &completed)?);
            }
        }

        while outputs.len() < self.stages.len() {
            let Some(joined) = active.next().await else {
                let pending: Vec<&String> = self
                    .execution_order
                    .iter()
                    .filter(|name| !outputs.contains_key(*name))
                    .collect();
                return Err(BatchflowError::Internal(format!(
                    "Deadlocked stage graph; remaining stages: {pending:?}"
                )));
            };

            let (stage_name, output) =
                joined.map_err(|e| BatchflowError::Internal(format!("Task join error: {e}")))?;

            if output.status == StageStatus::Fail {
                for task in active.iter() {
                    task.abort();
                }
                let error = output.error.clone().unwrap_or_else(|| "unknown error".to_string());
                outputs.insert(stage_name.clone(), output);
                return Ok(GraphExecutionResult {
                    outputs,
                    duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                    success: false,
                    error: Some(format!("Stage '{stage_name}' failed: {error}")),
                    failed_stage: Some(stage_name),
                });
            }

            if pending_consumers.get(stage_name.as_str()).copied().unwrap_or(0) > 0 {
                completed.insert(stage_name.clone(), output.data.clone().unwrap_or_default());
            }
            outputs.insert(stage_name.clone(), output);

            for child in &self.execution_order {
                let Some(spec) = self.stages.get(child) else {
                    continue;
                };
                if !spec.dependencies.contains(&stage_name) {
                    continue;
                }
                if let Some(count) = in_degree.get_mut(child.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        active.push(self.spawn_stage_task(child, ctx.clone(), &completed)?);
                        self.release_inputs(spec, &mut pending_consumers, &mut completed, &mut outputs);
                    }
                }
            }
        }

        Ok(GraphExecutionResult {
            outputs,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            success: true,
            error: None,
            failed_stage: None,
        })
    }

    /// Drops the data of `spec`'s dependencies once their last consumer has
    /// started. Intermediate stages also lose the data kept in the result.
    fn release_inputs(
        &self,
        spec: &StageSpec,
        pending_consumers: &mut HashMap<&str, usize>,
        completed: &mut HashMap<String, StageData>,
        outputs: &mut HashMap<String, StageOutput>,
    ) {
        for dep in &spec.dependencies {
            let Some(count) = pending_consumers.get_mut(dep.as_str()) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count > 0 {
                continue;
            }

            completed.remove(dep);
            let intermediate = self
                .stages
                .get(dep)
                .is_some_and(|dep_spec| dep_spec.kind.is_intermediate());
            if let Some(output) = outputs.get_mut(dep).filter(|_| intermediate) {
                output.data = None;
                debug!(stage = %dep, "released intermediate stage data");
            }
        }
    }

    fn spawn_stage_task(
        &self,
        stage_name: &str,
        ctx: Arc<PipelineContext>,
        completed: &HashMap<String, StageData>,
    ) -> Result<StageTask, BatchflowError> {
        let spec = self
            .stages
            .get(stage_name)
            .cloned()
            .ok_or_else(|| BatchflowError::Internal(format!("unknown stage '{stage_name}'")))?;
        let stage_name = stage_name.to_string();

        let prior_outputs: HashMap<String, StageData> = spec
            .dependencies
            .iter()
            .filter_map(|dep| completed.get(dep).map(|data| (dep.clone(), data.clone())))
            .collect();
        let inputs = StageInputs::new(prior_outputs, spec.dependencies.clone(), &stage_name, true);

        Ok(tokio::spawn(async move {
            let stage_ctx = StageContext::new(ctx.clone(), &stage_name, inputs);

            debug!(stage = %stage_name, kind = %spec.kind, "starting stage");
            ctx.try_emit_event(
                "stage.started",
                Some(serde_json::json!({
                    "stage": &stage_name,
                    "kind": spec.kind,
                })),
            );

            let stage_start = Instant::now();
            let output = spec.runner.execute(&stage_ctx).await;
            let stage_duration_ms = stage_start.elapsed().as_secs_f64() * 1000.0;

            match output.status {
                StageStatus::Fail => ctx.try_emit_event(
                    "stage.failed",
                    Some(serde_json::json!({
                        "stage": &stage_name,
                        "error": output.error,
                        "error_kind": output.error_kind,
                        "duration_ms": stage_duration_ms,
                    })),
                ),
                StageStatus::Ok => ctx.try_emit_event(
                    "stage.completed",
                    Some(serde_json::json!({
                        "stage": &stage_name,
                        "duration_ms": stage_duration_ms,
                    })),
                ),
            }

            (stage_name, output)
        }))
    }
}

fn topological_sort(stages: &HashMap<String, StageSpec>, stage_order: &[String]) -> Vec<String> {
    fn visit(
        node: &str,
        stages: &HashMap<String, StageSpec>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(node) || temp_visited.contains(node) {
            return;
        }

        temp_visited.insert(node.to_string());

        if let Some(spec) = stages.get(node) {
            let mut deps: Vec<&String> = spec.dependencies.iter().collect();
            deps.sort();
            for dep in deps {
                visit(dep, stages, visited, temp_visited, result);
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());
    }

    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    for name in stage_order {
        visit(name, stages, &mut visited, &mut temp_visited, &mut result);
    }

    result
}
