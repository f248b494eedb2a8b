//! The projection-only query dialect understood by the local warehouses.
//!
//! ```text
//! SELECT col[, col ...] FROM [project:dataset.table]
//! SELECT *              FROM `project.dataset.table`;
//! ```

use super::TableReference;
use crate::errors::ExtractError;
use crate::records::TableSchema;
use regex::Regex;
use std::sync::LazyLock;

static SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+(?P<columns>.+?)\s+FROM\s+(?:\[(?P<legacy>[^\]]+)\]|`(?P<standard>[^`]+)`)\s*;?\s*$",
    )
    .expect("select pattern is valid")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// The selected columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `SELECT *`.
    All,
    /// An explicit column list.
    Columns(Vec<String>),
}

/// A parsed `SELECT ... FROM ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// The selected columns.
    pub projection: Projection,
    /// The queried table.
    pub table: TableReference,
}

impl ParsedQuery {
    /// Parses `sql`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidQuery`] for anything outside the
    /// dialect.
    pub fn parse(sql: &str) -> Result<Self, ExtractError> {
        let caps = SELECT
            .captures(sql)
            .ok_or_else(|| ExtractError::invalid_query(sql, "expected SELECT <columns> FROM <table>"))?;

        let table_spec = caps
            .name("legacy")
            .or_else(|| caps.name("standard"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let table = TableReference::parse(table_spec, None)
            .map_err(|e| ExtractError::invalid_query(sql, e.to_string()))?;

        let columns = caps["columns"].trim();
        let projection = if columns == "*" {
            Projection::All
        } else {
            let names: Vec<String> = columns.split(',').map(|c| c.trim().to_string()).collect();
            if let Some(bad) = names.iter().find(|c| !IDENTIFIER.is_match(c)) {
                return Err(ExtractError::invalid_query(
                    sql,
                    format!("'{bad}' is not a column name"),
                ));
            }
            Projection::Columns(names)
        };

        Ok(Self { projection, table })
    }

    /// Checks the projection against the table schema and returns the
    /// column list to emit.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidQuery`] naming the first column the
    /// schema does not declare.
    pub fn resolve_columns(&self, sql: &str, schema: &TableSchema) -> Result<Vec<String>, ExtractError> {
        match &self.projection {
            Projection::All => Ok(schema.field_names()),
            Projection::Columns(columns) => {
                if let Some(missing) = columns.iter().find(|c| schema.field(c).is_none()) {
                    return Err(ExtractError::invalid_query(
                        sql,
                        format!("unrecognized column '{missing}' in {}", self.table),
                    ));
                }
                Ok(columns.clone())
            }
        }
    }
}
