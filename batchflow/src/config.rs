//! Runner configuration.
//!
//! [`PipelineOptions`] is what the command line (or an embedding program)
//! supplies; [`PipelineOptions::validate`] turns it into a [`JobConfig`]
//! before any data is touched.

use crate::errors::ConfigError;
use crate::warehouse::TableReference;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of parallel partitions.
pub const DEFAULT_PARTITIONS: usize = 4;

/// Default root directory of the local warehouse.
pub const DEFAULT_WAREHOUSE_DIR: &str = "warehouse";

/// The execution engine a job is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// In-process parallel execution on the tokio runtime.
    #[default]
    Direct,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for RunnerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "directrunner" | "local" => Ok(Self::Direct),
            _ => Err(ConfigError::UnsupportedRunner(s.to_string())),
        }
    }
}

/// Unvalidated job options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Default project for unqualified table references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Requested runner name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    /// Execution region, recorded on the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Destination table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Root of the local warehouse.
    pub warehouse_dir: PathBuf,
    /// Parallel partitions for filtering and counting.
    pub partitions: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            project: None,
            runner: None,
            region: None,
            output: None,
            warehouse_dir: PathBuf::from(DEFAULT_WAREHOUSE_DIR),
            partitions: DEFAULT_PARTITIONS,
        }
    }
}

impl PipelineOptions {
    /// Sets the destination table.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Sets the default project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the partition count.
    #[must_use]
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Checks the options and resolves the destination table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `output` is missing or malformed, the
    /// runner is unknown, or `partitions` is zero.
    pub fn validate(&self) -> Result<JobConfig, ConfigError> {
        let output = self
            .output
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingOutput)?;
        let output = TableReference::parse(output, self.project.as_deref())?;

        let runner = match self.runner.as_deref() {
            Some(name) => name.parse()?,
            None => RunnerKind::default(),
        };

        if self.partitions == 0 {
            return Err(ConfigError::InvalidPartitions(self.partitions));
        }

        Ok(JobConfig {
            output,
            project: self.project.clone(),
            region: self.region.clone(),
            runner,
            warehouse_dir: self.warehouse_dir.clone(),
            partitions: self.partitions,
        })
    }
}

/// Validated job configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Destination table, fully qualified.
    pub output: TableReference,
    /// Default project.
    pub project: Option<String>,
    /// Execution region.
    pub region: Option<String>,
    /// Execution engine.
    pub runner: RunnerKind,
    /// Root of the local warehouse.
    pub warehouse_dir: PathBuf,
    /// Parallel partitions (at least 1).
    pub partitions: usize,
}

impl JobConfig {
    /// Creates a config for `output` with default settings.
    #[must_use]
    pub fn new(output: TableReference) -> Self {
        Self {
            output,
            project: None,
            region: None,
            runner: RunnerKind::default(),
            warehouse_dir: PathBuf::from(DEFAULT_WAREHOUSE_DIR),
            partitions: DEFAULT_PARTITIONS,
        }
    }

    /// Sets the partition count, clamped to at least 1.
    #[must_use]
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_output() {
        assert_eq!(
            PipelineOptions::default().validate().unwrap_err(),
            ConfigError::MissingOutput
        );
        assert_eq!(
            PipelineOptions::default().with_output("  ").validate().unwrap_err(),
            ConfigError::MissingOutput
        );
    }

    #[test]
    fn test_output_uses_project_default() {
        let config = PipelineOptions::default()
            .with_project("my-proj")
            .with_output("weather.tornadoes")
            .validate()
            .unwrap();

        assert_eq!(config.output, TableReference::new("my-proj", "weather", "tornadoes"));
        assert_eq!(config.runner, RunnerKind::Direct);
        assert_eq!(config.partitions, DEFAULT_PARTITIONS);
    }

    #[test]
    fn test_unqualified_output_without_project() {
        let err = PipelineOptions::default()
            .with_output("weather.tornadoes")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTable { .. }));
    }

    #[test]
    fn test_runner_names() {
        for name in ["direct", "DirectRunner", "LOCAL"] {
            assert_eq!(name.parse::<RunnerKind>().unwrap(), RunnerKind::Direct);
        }
        assert_eq!(
            "DataflowRunner".parse::<RunnerKind>().unwrap_err(),
            ConfigError::UnsupportedRunner("DataflowRunner".to_string())
        );
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let err = PipelineOptions::default()
            .with_output("p:d.t")
            .with_partitions(0)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidPartitions(0));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: PipelineOptions = serde_json::from_value(serde_json::json!({
            "output": "p:d.t",
            "region": "us-central1",
            "warehouse_dir": "/tmp/wh",
            "partitions": 2
        }))
        .unwrap();

        let config = options.validate().unwrap();
        assert_eq!(config.region.as_deref(), Some("us-central1"));
        assert_eq!(config.partitions, 2);
    }
}
