//! The warehouse's native row representation.

use crate::errors::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row as the warehouse transports it: column name to JSON value.
///
/// Integers may arrive either as JSON numbers or as decimal strings, which
/// is how 64-bit integers travel over JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableRow(Map<String, Value>);

impl TableRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, builder style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Sets a column.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Returns a column value, treating JSON `null` as absent.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|v| !v.is_null())
    }

    /// Returns the column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps only the given columns.
    ///
    /// Columns missing from the row are carried as `null`.
    #[must_use]
    pub fn project(&self, columns: &[String]) -> Self {
        let mut projected = Map::new();
        for column in columns {
            projected.insert(
                column.clone(),
                self.0.get(column).cloned().unwrap_or(Value::Null),
            );
        }
        Self(projected)
    }

    /// Reads a nullable BOOLEAN column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::TypeMismatch`] when the value is present but
    /// not a boolean.
    pub fn optional_bool(&self, column: &str) -> Result<Option<bool>, SchemaError> {
        match self.get(column) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(SchemaError::mismatch(column, "BOOLEAN", kind_of(other))),
        }
    }

    /// Reads a nullable INTEGER column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::TypeMismatch`] when the value is present but
    /// not an integer.
    pub fn optional_i64(&self, column: &str) -> Result<Option<i64>, SchemaError> {
        match self.get(column) {
            None => Ok(None),
            Some(value) => as_i64(value)
                .map(Some)
                .ok_or_else(|| SchemaError::mismatch(column, "INTEGER", kind_of(value))),
        }
    }

    /// Reads a REQUIRED INTEGER column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingField`] when absent or null.
    pub fn required_i64(&self, column: &str) -> Result<i64, SchemaError> {
        self.optional_i64(column)?
            .ok_or_else(|| SchemaError::missing(column))
    }

    /// Consumes the row, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TableRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Interprets a JSON value as an INT64: a whole number or a decimal string.
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers, or strings holding a finite decimal number.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_absent() {
        let row = TableRow::new().with("tornado", Value::Null).with("month", 3);
        assert!(row.get("tornado").is_none());
        assert_eq!(row.optional_bool("tornado").unwrap(), None);
    }

    #[test]
    fn test_integer_accepts_decimal_string() {
        let row = TableRow::new().with("month", "7");
        assert_eq!(row.required_i64("month").unwrap(), 7);
    }

    #[test]
    fn test_required_missing() {
        let row = TableRow::new();
        assert_eq!(row.required_i64("month"), Err(SchemaError::missing("month")));
    }

    #[test]
    fn test_type_mismatch() {
        let row = TableRow::new().with("tornado", "yes").with("month", 2.5);
        assert_eq!(
            row.optional_bool("tornado"),
            Err(SchemaError::mismatch("tornado", "BOOLEAN", "string"))
        );
        assert_eq!(
            row.required_i64("month"),
            Err(SchemaError::mismatch("month", "INTEGER", "float"))
        );
    }

    #[test]
    fn test_project_fills_nulls() {
        let row = TableRow::new().with("a", 1).with("b", 2);
        let projected = row.project(&["b".to_string(), "c".to_string()]);

        assert_eq!(projected.columns().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(serde_json::to_value(&projected).unwrap(), json!({"b": 2, "c": null}));
    }
}
