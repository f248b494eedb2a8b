//! Run identity for correlating a job execution.

use crate::config::RunnerKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifies one execution of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Unique id of this run.
    pub run_id: Uuid,

    /// Name of the job being run.
    pub job: String,

    /// Execution engine.
    pub runner: RunnerKind,

    /// Default project, when one was configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Execution region, when one was configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates an identity for a new run of `job`.
    #[must_use]
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.into(),
            runner: RunnerKind::default(),
            project: None,
            region: None,
            started_at: Utc::now(),
        }
    }

    /// Sets the runner.
    #[must_use]
    pub fn with_runner(mut self, runner: RunnerKind) -> Self {
        self.runner = runner;
        self
    }

    /// Sets the project.
    #[must_use]
    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Adds the correlation fields to an event payload.
    pub fn enrich(&self, payload: &mut Map<String, Value>) {
        payload.insert("run_id".to_string(), Value::String(self.run_id.to_string()));
        payload.insert("job".to_string(), Value::String(self.job.clone()));
        payload.insert("runner".to_string(), Value::String(self.runner.to_string()));
        if let Some(region) = &self.region {
            payload.insert("region".to_string(), Value::String(region.clone()));
        }
    }

    /// Start time in RFC 3339 form.
    #[must_use]
    pub fn started_at_rfc3339(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
