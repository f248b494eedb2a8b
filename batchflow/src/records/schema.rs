//! Declarative table schemas.

use super::row::{as_f64, as_i64, kind_of};
use super::TableRow;
use crate::errors::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// `true` / `false`.
    Boolean,
    /// RFC 3339 timestamp string or seconds since the epoch.
    Timestamp,
}

impl FieldType {
    /// Returns true if `value` is an acceptable encoding of this type.
    ///
    /// INTEGER and FLOAT take JSON numbers or strings holding one, as
    /// warehouses export wide numbers as strings.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => as_i64(value).is_some(),
            Self::Float => as_f64(value).is_some(),
            Self::Boolean => value.is_boolean(),
            Self::Timestamp => match value {
                Value::Number(_) => true,
                Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
                _ => false,
            },
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// Whether a column may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    /// Value may be absent or null.
    #[default]
    Nullable,
    /// Value must be present and non-null.
    Required,
}

/// One column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Nullability.
    #[serde(default)]
    pub mode: FieldMode,
}

/// An ordered list of column declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// The columns.
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    /// Starts a schema declaration.
    #[must_use]
    pub fn builder() -> TableSchemaBuilder {
        TableSchemaBuilder::default()
    }

    /// Looks up a column.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the column names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Checks that `row` can be inserted into a table with this schema.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: an unknown column, a required
    /// column that is missing or null, or a value of the wrong type.
    pub fn validate_row(&self, row: &TableRow) -> Result<(), SchemaError> {
        if let Some(unknown) = row.columns().find(|c| self.field(c).is_none()) {
            return Err(SchemaError::UnknownField {
                field: unknown.to_string(),
            });
        }

        for field in &self.fields {
            match row.get(&field.name) {
                None if field.mode == FieldMode::Required => {
                    return Err(SchemaError::missing(&field.name));
                }
                None => {}
                Some(value) if !field.field_type.accepts(value) => {
                    return Err(SchemaError::mismatch(
                        &field.name,
                        field.field_type.to_string(),
                        kind_of(value),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Builder for [`TableSchema`].
#[derive(Debug, Default)]
pub struct TableSchemaBuilder {
    fields: Vec<FieldSchema>,
}

impl TableSchemaBuilder {
    /// Declares a REQUIRED column.
    #[must_use]
    pub fn required(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(name, field_type, FieldMode::Required)
    }

    /// Declares a NULLABLE column.
    #[must_use]
    pub fn nullable(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(name, field_type, FieldMode::Nullable)
    }

    /// Declares a column.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType, mode: FieldMode) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            field_type,
            mode,
        });
        self
    }

    /// Finishes the declaration.
    #[must_use]
    pub fn build(self) -> TableSchema {
        TableSchema { fields: self.fields }
    }
}
