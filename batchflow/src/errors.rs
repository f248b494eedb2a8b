//! Error types for the batchflow runner.
//!
//! Fatal conditions (bad configuration, an unreachable source, an unavailable
//! sink) surface as [`BatchflowError`]. Rows the sink refuses are *not*
//! errors: they are reported as failed inserts on the load result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for batchflow operations.
#[derive(Debug, Error)]
pub enum BatchflowError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The source could not be queried.
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// The sink could not accept the load.
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    /// A row did not match the expected record shape.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the pipeline.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// An undeclared dependency was accessed.
    #[error("{0}")]
    UndeclaredDependency(#[from] UndeclaredDependencyError),

    /// A stage execution error.
    #[error("Stage execution error: {0}")]
    StageExecution(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BatchflowError {
    /// Process exit status for this error.
    ///
    /// `2` configuration, `3` extraction, `4` load, `1` everything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Extract(_) => 3,
            Self::Load(_) => 4,
            _ => 1,
        }
    }

    /// Short machine-readable category.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Extract(_) => "extract",
            Self::Load(_) => "load",
            Self::Schema(_) => "schema",
            Self::Validation(_) | Self::CycleDetected(_) => "validation",
            Self::UndeclaredDependency(_) => "undeclared_dependency",
            Self::StageExecution(_) => "stage",
            Self::Internal(_) => "internal",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Structured form of the source or sink error, if this is one.
    #[must_use]
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            Self::Extract(err) => serde_json::to_value(err).ok(),
            Self::Load(err) => serde_json::to_value(err).ok(),
            _ => None,
        }
    }

    /// Rebuilds the error a stage reported as `kind`, `message` and
    /// optional [`detail`](Self::detail).
    #[must_use]
    pub fn from_stage_failure(
        stage: &str,
        kind: Option<&str>,
        message: &str,
        detail: Option<&serde_json::Value>,
    ) -> Self {
        fn decoded<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> Option<T> {
            serde_json::from_value(value.clone()).ok()
        }

        match kind {
            Some("extract") => Self::Extract(
                detail
                    .and_then(decoded)
                    .unwrap_or_else(|| ExtractError::Io(message.to_string())),
            ),
            Some("load") => Self::Load(
                detail
                    .and_then(decoded)
                    .unwrap_or_else(|| LoadError::Io(message.to_string())),
            ),
            _ => Self::StageExecution(format!("stage '{stage}' failed: {message}")),
        }
    }
}

impl From<serde_json::Error> for BatchflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised while validating runner configuration.
///
/// These are always reported before any data is read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `--output` was not supplied.
    #[error("missing required option --output (expected PROJECT:DATASET.TABLE)")]
    MissingOutput,

    /// A table reference could not be parsed.
    #[error("invalid table reference '{value}': {reason}")]
    InvalidTable {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested runner is not available in this build.
    #[error("unsupported runner '{0}' (available: direct)")]
    UnsupportedRunner(String),

    /// The partition count is out of range.
    #[error("invalid partition count {0}: must be at least 1")]
    InvalidPartitions(usize),
}

impl ConfigError {
    /// Creates an invalid table error.
    #[must_use]
    pub fn invalid_table(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading from the source.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum ExtractError {
    /// The source could not be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The query was rejected by the source.
    #[error("invalid query '{query}': {reason}")]
    InvalidQuery {
        /// The query text.
        query: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The queried table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A result row could not be decoded.
    #[error("malformed row: {source}")]
    Row {
        /// The decoding failure.
        #[from]
        source: SchemaError,
    },

    /// Reading table data failed.
    #[error("read failed: {0}")]
    Io(String),
}

impl ExtractError {
    /// Creates an invalid query error.
    #[must_use]
    pub fn invalid_query(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            query: query.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal errors raised by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum LoadError {
    /// The sink could not be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The destination does not exist and may not be created.
    #[error("destination table not found: {0}")]
    TableNotFound(String),

    /// The destination already holds rows and the write requires it empty.
    #[error("destination table is not empty: {0}")]
    TableNotEmpty(String),

    /// Writing table data failed.
    #[error("write failed: {0}")]
    Io(String),
}

/// Errors raised when a row does not fit a declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum SchemaError {
    /// A required field is missing or null.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field holds a value of the wrong type.
    #[error("field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Declared type.
        expected: String,
        /// Observed JSON value kind.
        found: String,
    },

    /// A field is not declared in the schema.
    #[error("unknown field '{field}'")]
    UnknownField {
        /// Field name.
        field: String,
    },
}

impl SchemaError {
    /// Creates a missing field error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        PipelineValidationError {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a stage reads output of a stage it does not depend on.
#[derive(Debug, Clone, Error)]
#[error("Undeclared dependency: stage '{stage}' attempted to access '{key}' which was not declared as a dependency")]
pub struct UndeclaredDependencyError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared key.
    pub key: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}
