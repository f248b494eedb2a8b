//! In-memory warehouse.

use super::query::ParsedQuery;
use super::write::{fingerprint_rows, plan_write, WriteMode};
use super::{LoadRequest, QuerySource, RowStream, TableReference, TableSink, WriteResult};
use crate::errors::{ExtractError, LoadError};
use crate::records::{TableRow, TableSchema};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type RejectPredicate = Arc<dyn Fn(&TableRow) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredTable {
    schema: TableSchema,
    rows: Vec<TableRow>,
}

/// A warehouse that keeps every table in memory.
///
/// Serves as both source and sink. Faults can be injected to exercise the
/// failure paths of a job: [`set_available`](Self::set_available) takes the
/// whole warehouse offline and
/// [`reject_inserts_where`](Self::reject_inserts_where) refuses selected rows.
pub struct InMemoryWarehouse {
    tables: DashMap<TableReference, StoredTable>,
    available: AtomicBool,
    reject: RwLock<Option<RejectPredicate>>,
}

impl std::fmt::Debug for InMemoryWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryWarehouse")
            .field("tables", &self.tables.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWarehouse {
    /// Creates an empty, reachable warehouse.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            available: AtomicBool::new(true),
            reject: RwLock::new(None),
        }
    }

    /// Creates (or replaces) a table with the given contents.
    pub fn create_table(&self, table: TableReference, schema: TableSchema, rows: Vec<TableRow>) {
        self.tables.insert(table, StoredTable { schema, rows });
    }

    /// Returns a copy of a table's rows.
    #[must_use]
    pub fn table_rows(&self, table: &TableReference) -> Option<Vec<TableRow>> {
        self.tables.get(table).map(|t| t.rows.clone())
    }

    /// Returns a table's schema.
    #[must_use]
    pub fn table_schema(&self, table: &TableReference) -> Option<TableSchema> {
        self.tables.get(table).map(|t| t.schema.clone())
    }

    /// Returns true if the table exists.
    #[must_use]
    pub fn contains_table(&self, table: &TableReference) -> bool {
        self.tables.contains_key(table)
    }

    /// Order-independent digest of a table's contents.
    #[must_use]
    pub fn fingerprint(&self, table: &TableReference) -> Option<String> {
        self.tables.get(table).map(|t| fingerprint_rows(&t.rows))
    }

    /// Makes the warehouse reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Refuses every inserted row for which `predicate` returns true.
    pub fn reject_inserts_where<F>(&self, predicate: F)
    where
        F: Fn(&TableRow) -> bool + Send + Sync + 'static,
    {
        *self.reject.write() = Some(Arc::new(predicate));
    }

    /// Stops refusing rows.
    pub fn clear_rejections(&self) {
        *self.reject.write() = None;
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuerySource for InMemoryWarehouse {
    async fn query(&self, sql: &str) -> Result<RowStream, ExtractError> {
        if !self.is_available() {
            return Err(ExtractError::Unavailable("in-memory warehouse is offline".to_string()));
        }

        let parsed = ParsedQuery::parse(sql)?;
        let stored = self
            .tables
            .get(&parsed.table)
            .map(|t| t.value().clone())
            .ok_or_else(|| ExtractError::TableNotFound(parsed.table.to_string()))?;
        let columns = parsed.resolve_columns(sql, &stored.schema)?;

        debug!(table = %parsed.table, rows = stored.rows.len(), "serving in-memory query");
        let rows = stored
            .rows
            .into_iter()
            .map(move |row| Ok::<_, ExtractError>(row.project(&columns)));
        Ok(stream::iter(rows).boxed())
    }
}

#[async_trait]
impl TableSink for InMemoryWarehouse {
    async fn write(&self, request: LoadRequest) -> Result<WriteResult, LoadError> {
        if !self.is_available() {
            return Err(LoadError::Unavailable("in-memory warehouse is offline".to_string()));
        }

        let reject = self.reject.read().clone();
        let existing = self.tables.get(&request.destination).map(|t| t.rows.len());
        let plan = plan_write(request, existing, |row| match &reject {
            Some(predicate) if predicate(row) => Some("row rejected by sink".to_string()),
            _ => None,
        })?;

        match plan.mode {
            WriteMode::Untouched => {}
            WriteMode::Replace => {
                self.tables.insert(
                    plan.destination,
                    StoredTable {
                        schema: plan.schema,
                        rows: plan.rows,
                    },
                );
            }
            WriteMode::Append => {
                self.tables
                    .entry(plan.destination)
                    .or_insert_with(|| StoredTable {
                        schema: plan.schema,
                        rows: Vec::new(),
                    })
                    .rows
                    .extend(plan.rows);
            }
        }

        Ok(plan.result)
    }
}
