//! Stage inputs with strictness enforcement.

use crate::errors::{BatchflowError, UndeclaredDependencyError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Data published by one stage.
pub type StageData = HashMap<String, Value>;

/// An immutable view of prior stage outputs.
///
/// In strict mode, reading a stage that is not a declared dependency is an
/// error, even when its output happens to be available.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    outputs: HashMap<String, StageData>,
    declared_dependencies: HashSet<String>,
    stage_name: String,
    strict: bool,
}

impl StageInputs {
    /// Creates new stage inputs.
    #[must_use]
    pub fn new(
        outputs: HashMap<String, StageData>,
        declared_dependencies: HashSet<String>,
        stage_name: impl Into<String>,
        strict: bool,
    ) -> Self {
        Self {
            outputs,
            declared_dependencies,
            stage_name: stage_name.into(),
            strict,
        }
    }

    fn check(&self, stage: &str) -> Result<(), UndeclaredDependencyError> {
        if self.strict && !self.declared_dependencies.contains(stage) {
            return Err(UndeclaredDependencyError::new(&self.stage_name, stage));
        }
        Ok(())
    }

    /// Gets the output of `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`UndeclaredDependencyError`] in strict mode if `stage` is
    /// not a declared dependency.
    pub fn get(&self, stage: &str) -> Result<Option<&StageData>, UndeclaredDependencyError> {
        self.check(stage)?;
        Ok(self.outputs.get(stage))
    }

    /// Gets one value from the output of `stage`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn get_value(&self, stage: &str, key: &str) -> Result<Option<&Value>, UndeclaredDependencyError> {
        self.check(stage)?;
        Ok(self.outputs.get(stage).and_then(|o| o.get(key)))
    }

    /// Decodes a value that `stage` must have published under `key`.
    ///
    /// # Errors
    ///
    /// Fails when `stage` is undeclared, the value is absent, or it does
    /// not decode as `T`.
    pub fn require<T: DeserializeOwned>(&self, stage: &str, key: &str) -> Result<T, BatchflowError> {
        let value = self.get_value(stage, key)?.ok_or_else(|| {
            BatchflowError::StageExecution(format!(
                "stage '{}' expected '{key}' from '{stage}', but it was not published",
                self.stage_name
            ))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Checks if output exists for a stage.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.outputs.contains_key(stage)
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn declared_dependencies(&self) -> &HashSet<String> {
        &self.declared_dependencies
    }

    /// Returns whether strict mode is enabled.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}
