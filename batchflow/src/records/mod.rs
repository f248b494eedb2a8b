//! Record shapes and their mapping to warehouse rows.
//!
//! Rows travel as [`TableRow`]s. Typed records declare their static shape
//! through [`Record::schema`] and convert explicitly with [`FromRow`] and
//! [`ToRow`]; nothing is inferred at runtime.

mod row;
mod schema;

pub use row::TableRow;
pub use schema::{FieldMode, FieldSchema, FieldType, TableSchema, TableSchemaBuilder};

use crate::errors::SchemaError;

/// A typed record with a statically declared table shape.
pub trait Record: Sized {
    /// The table schema this record reads from or writes to.
    fn schema() -> TableSchema;
}

/// Decodes a record from a warehouse row.
pub trait FromRow: Sized {
    /// Converts `row` into `Self`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when a required column is missing or a
    /// column has the wrong type.
    fn from_row(row: &TableRow) -> Result<Self, SchemaError>;
}

/// Encodes a record as a warehouse row.
pub trait ToRow {
    /// Converts `self` into a row.
    fn to_row(&self) -> TableRow;
}
