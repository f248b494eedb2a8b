//! Tabular warehouse collaborators.
//!
//! A job talks to its source through [`QuerySource`] ("run this query, give
//! me rows") and to its destination through [`TableSink`] ("write these rows
//! to that table"). Two local implementations back both traits:
//!
//! - [`InMemoryWarehouse`]: tables in memory, with fault injection
//! - [`LocalWarehouse`]: one JSON Lines file plus a schema file per table

mod local;
mod memory;
mod query;
mod table;
mod write;

pub use local::LocalWarehouse;
pub use memory::InMemoryWarehouse;
pub use query::{ParsedQuery, Projection};
pub use table::TableReference;
pub use write::fingerprint_rows;

use crate::errors::{ExtractError, LoadError};
use crate::records::{TableRow, TableSchema};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lazily produced sequence of query result rows.
pub type RowStream = BoxStream<'static, Result<TableRow, ExtractError>>;

/// What to do with rows already in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Replace the existing contents.
    #[default]
    WriteTruncate,
    /// Keep existing rows and add the new ones.
    WriteAppend,
    /// Fail unless the destination is empty.
    WriteEmpty,
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteTruncate => write!(f, "WRITE_TRUNCATE"),
            Self::WriteAppend => write!(f, "WRITE_APPEND"),
            Self::WriteEmpty => write!(f, "WRITE_EMPTY"),
        }
    }
}

/// Whether a missing destination may be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDisposition {
    /// Create the table from the request schema if absent.
    #[default]
    CreateIfNeeded,
    /// Fail if the table is absent.
    CreateNever,
}

impl fmt::Display for CreateDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateIfNeeded => write!(f, "CREATE_IF_NEEDED"),
            Self::CreateNever => write!(f, "CREATE_NEVER"),
        }
    }
}

/// One batch of rows bound for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// Destination table.
    pub destination: TableReference,
    /// Schema the rows must satisfy (and the table gets when created).
    pub schema: TableSchema,
    /// Rows to write.
    pub rows: Vec<TableRow>,
    /// Handling of existing rows.
    pub write_disposition: WriteDisposition,
    /// Handling of a missing table.
    pub create_disposition: CreateDisposition,
}

impl LoadRequest {
    /// Creates a truncate-and-replace, create-if-needed request.
    #[must_use]
    pub fn new(destination: TableReference, schema: TableSchema, rows: Vec<TableRow>) -> Self {
        Self {
            destination,
            schema,
            rows,
            write_disposition: WriteDisposition::default(),
            create_disposition: CreateDisposition::default(),
        }
    }

    /// Sets the write disposition.
    #[must_use]
    pub fn with_write_disposition(mut self, disposition: WriteDisposition) -> Self {
        self.write_disposition = disposition;
        self
    }

    /// Sets the create disposition.
    #[must_use]
    pub fn with_create_disposition(mut self, disposition: CreateDisposition) -> Self {
        self.create_disposition = disposition;
        self
    }
}

/// A row the sink refused, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedInsert {
    /// The rejected row.
    pub row: TableRow,
    /// Why it was rejected.
    pub reason: String,
}

/// Outcome of a load that reached the sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Destinations whose contents were committed.
    pub successful_loads: Vec<TableReference>,
    /// Rows that were not written.
    pub failed_inserts: Vec<FailedInsert>,
    /// Number of rows written.
    pub rows_written: u64,
}

impl WriteResult {
    /// Number of rows that were not written.
    #[must_use]
    pub fn failed_insert_count(&self) -> u64 {
        self.failed_inserts.len() as u64
    }
}

/// A queryable tabular source.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Runs `sql` and streams the result rows.
    ///
    /// # Errors
    ///
    /// Fails up front when the source is unreachable, the query is invalid,
    /// or the table does not exist. Read problems after the stream starts
    /// arrive as `Err` items.
    async fn query(&self, sql: &str) -> Result<RowStream, ExtractError>;
}

/// A table-writing sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Writes one batch.
    ///
    /// Rows that do not fit the schema are returned as failed inserts.
    ///
    /// # Errors
    ///
    /// Fails only when the load as a whole cannot happen: the sink is
    /// unreachable, or a disposition forbids the write.
    async fn write(&self, request: LoadRequest) -> Result<WriteResult, LoadError>;
}
