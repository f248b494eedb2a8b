//! Fully-qualified warehouse table names.

use crate::errors::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static TABLE_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<project>[A-Za-z0-9][A-Za-z0-9-]*)[:.])?(?P<dataset>[A-Za-z0-9_]+)\.(?P<table>[A-Za-z0-9_]+)$",
    )
    .expect("table spec pattern is valid")
});

/// Identifies one table: `PROJECT:DATASET.TABLE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableReference {
    /// Project that owns the dataset.
    pub project: String,
    /// Dataset holding the table.
    pub dataset: String,
    /// Table name.
    pub table: String,
}

impl TableReference {
    /// Creates a reference from its parts.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parses `PROJECT:DATASET.TABLE`, `PROJECT.DATASET.TABLE` or
    /// `DATASET.TABLE`.
    ///
    /// The unqualified form takes its project from `default_project`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTable`] when the value does not match
    /// any accepted form, or is unqualified with no default project.
    pub fn parse(value: &str, default_project: Option<&str>) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        let caps = TABLE_SPEC.captures(trimmed).ok_or_else(|| {
            ConfigError::invalid_table(
                value,
                "expected PROJECT:DATASET.TABLE, PROJECT.DATASET.TABLE or DATASET.TABLE",
            )
        })?;

        let project = match (caps.name("project"), default_project) {
            (Some(project), _) => project.as_str().to_string(),
            (None, Some(project)) if !project.trim().is_empty() => project.trim().to_string(),
            (None, _) => {
                return Err(ConfigError::invalid_table(
                    value,
                    "table has no project and no default project was given (--project)",
                ))
            }
        };

        Ok(Self {
            project,
            dataset: caps["dataset"].to_string(),
            table: caps["table"].to_string(),
        })
    }

    /// Returns the `DATASET.TABLE` part.
    #[must_use]
    pub fn dataset_table(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project, self.dataset, self.table)
    }
}

impl FromStr for TableReference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_form() {
        let table: TableReference = "my-project:weather.tornadoes".parse().unwrap();
        assert_eq!(table, TableReference::new("my-project", "weather", "tornadoes"));
        assert_eq!(table.to_string(), "my-project:weather.tornadoes");
    }

    #[test]
    fn test_parse_dotted_form() {
        let table: TableReference = "my-project.weather.tornadoes".parse().unwrap();
        assert_eq!(table.project, "my-project");
        assert_eq!(table.dataset_table(), "weather.tornadoes");
    }

    #[test]
    fn test_parse_unqualified_uses_default_project() {
        let table = TableReference::parse("weather.tornadoes", Some("fallback")).unwrap();
        assert_eq!(table.project, "fallback");

        let err = TableReference::parse("weather.tornadoes", None).unwrap_err();
        assert!(err.to_string().contains("--project"));
    }

    #[test]
    fn test_explicit_project_wins_over_default() {
        let table = TableReference::parse("p:d.t", Some("other")).unwrap();
        assert_eq!(table.project, "p");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "tornadoes", "p:d", "p:d.t.x", "p:d-x.t", "p:d.t name"] {
            assert!(
                TableReference::parse(bad, Some("p")).is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }
}
