//! Stage status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a stage plays in an ETL job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Reads records from a source.
    Extract,
    /// Filters, projects or reshapes records one at a time.
    #[default]
    Transform,
    /// Groups and reduces records across partitions.
    Aggregate,
    /// Writes records to a sink.
    Load,
    /// Observes results without changing them (logging, counters).
    Inspect,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => write!(f, "extract"),
            Self::Transform => write!(f, "transform"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::Load => write!(f, "load"),
            Self::Inspect => write!(f, "inspect"),
        }
    }
}

impl StageKind {
    /// Whether the stage only feeds other stages. Its data is dropped from
    /// the run result once every consumer has started.
    #[must_use]
    pub fn is_intermediate(&self) -> bool {
        matches!(self, Self::Extract | Self::Transform | Self::Aggregate)
    }
}

/// The execution status of a finished stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}
