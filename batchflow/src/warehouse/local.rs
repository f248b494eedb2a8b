//! Directory-backed warehouse.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<project>/<dataset>/<table>.jsonl        one JSON object per line
//! <root>/<project>/<dataset>/<table>.schema.json  TableSchema as JSON
//! ```

use super::query::ParsedQuery;
use super::write::{fingerprint_rows, plan_write, WriteMode};
use super::{
    LoadRequest, QuerySource, RowStream, TableReference, TableSink, WriteDisposition, WriteResult,
};
use crate::errors::{ExtractError, LoadError};
use crate::records::{TableRow, TableSchema};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};

/// A warehouse stored as plain files under one root directory.
#[derive(Debug, Clone)]
pub struct LocalWarehouse {
    root: PathBuf,
}

impl LocalWarehouse {
    /// Opens a warehouse rooted at `root`.
    ///
    /// The directory is not created; a missing root makes the warehouse
    /// unreachable.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a table's data file.
    #[must_use]
    pub fn data_path(&self, table: &TableReference) -> PathBuf {
        self.dataset_dir(table).join(format!("{}.jsonl", table.table))
    }

    /// Path of a table's schema file.
    #[must_use]
    pub fn schema_path(&self, table: &TableReference) -> PathBuf {
        self.dataset_dir(table).join(format!("{}.schema.json", table.table))
    }

    fn dataset_dir(&self, table: &TableReference) -> PathBuf {
        self.root.join(&table.project).join(&table.dataset)
    }

    fn root_missing(&self) -> String {
        format!("warehouse root {} is not a directory", self.root.display())
    }

    fn ensure_root(&self) -> Result<(), String> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(self.root_missing())
        }
    }

    /// Reads a table's schema.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::TableNotFound`] when the table does not exist.
    pub fn read_schema(&self, table: &TableReference) -> Result<TableSchema, ExtractError> {
        let path = self.schema_path(table);
        let text = fs::read_to_string(&path).map_err(|e| schema_read_error(table, &path, &e))?;
        parse_schema(&path, &text)
    }

    /// Reads all rows of a table.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::TableNotFound`] when the table does not
    /// exist, or [`ExtractError::Io`] when a line is not a JSON object.
    pub fn read_rows(&self, table: &TableReference) -> Result<Vec<TableRow>, ExtractError> {
        self.read_schema(table)?;
        let path = self.data_path(table);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ExtractError::Io(format!("{}: {e}", path.display()))),
        };

        let mut rows = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ExtractError::Io(format!("{}: {e}", path.display())))?;
            if let Some(row) = parse_line(&path, index, &line)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Order-independent digest of a table's contents.
    ///
    /// # Errors
    ///
    /// See [`read_rows`](Self::read_rows).
    pub fn fingerprint(&self, table: &TableReference) -> Result<String, ExtractError> {
        Ok(fingerprint_rows(&self.read_rows(table)?))
    }

    fn write_blocking(&self, request: LoadRequest) -> Result<WriteResult, LoadError> {
        self.ensure_root().map_err(LoadError::Unavailable)?;

        let destination = request.destination.clone();
        let exists = self.schema_path(&destination).is_file();
        let existing = match (exists, request.write_disposition) {
            (false, _) => None,
            (true, WriteDisposition::WriteEmpty) => Some(
                self.read_rows(&destination)
                    .map_err(|e| LoadError::Io(e.to_string()))?
                    .len(),
            ),
            (true, _) => Some(0),
        };

        let plan = plan_write(request, existing, |_| None)?;
        let dir = self.dataset_dir(&destination);

        match plan.mode {
            WriteMode::Untouched => {
                debug!(table = %destination, "every row refused; table left unchanged");
            }
            WriteMode::Replace => {
                fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
                let schema_json = serde_json::to_vec_pretty(&plan.schema)
                    .map_err(|e| LoadError::Io(e.to_string()))?;
                // The schema file marks the table as present, so it goes last.
                replace_file(&dir, &self.data_path(&destination), &encode_rows(&plan.rows)?)?;
                replace_file(&dir, &self.schema_path(&destination), &schema_json)?;
            }
            WriteMode::Append => {
                fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
                let path = self.data_path(&destination);
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| io_error(&path, &e))?;
                file.write_all(&encode_rows(&plan.rows)?)
                    .map_err(|e| io_error(&path, &e))?;
                if !exists {
                    let schema_json = serde_json::to_vec_pretty(&plan.schema)
                        .map_err(|e| LoadError::Io(e.to_string()))?;
                    replace_file(&dir, &self.schema_path(&destination), &schema_json)?;
                }
            }
        }

        info!(
            table = %destination,
            rows_written = plan.result.rows_written,
            failed_inserts = plan.result.failed_insert_count(),
            "table written"
        );
        Ok(plan.result)
    }
}

fn schema_read_error(table: &TableReference, path: &Path, err: &std::io::Error) -> ExtractError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ExtractError::TableNotFound(table.to_string()),
        _ => ExtractError::Io(format!("{}: {err}", path.display())),
    }
}

fn parse_schema(path: &Path, text: &str) -> Result<TableSchema, ExtractError> {
    serde_json::from_str(text)
        .map_err(|e| ExtractError::Io(format!("{}: invalid schema: {e}", path.display())))
}

fn parse_line(path: &Path, index: usize, line: &str) -> Result<Option<TableRow>, ExtractError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some).map_err(|e| {
        ExtractError::Io(format!("{}:{}: invalid row: {e}", path.display(), index + 1))
    })
}

fn encode_rows(rows: &[TableRow]) -> Result<Vec<u8>, LoadError> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row).map_err(|e| LoadError::Io(e.to_string()))?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Writes `contents` to a temporary file in `dir`, then renames it over
/// `target`, so readers never observe a half-written table.
fn replace_file(dir: &Path, target: &Path, contents: &[u8]) -> Result<(), LoadError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, &e))?;
    tmp.write_all(contents).map_err(|e| io_error(target, &e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(target, &e))?;
    tmp.persist(target).map_err(|e| io_error(target, &e.error))?;
    Ok(())
}

fn io_error(path: &Path, err: &std::io::Error) -> LoadError {
    LoadError::Io(format!("{}: {err}", path.display()))
}

#[async_trait]
impl QuerySource for LocalWarehouse {
    async fn query(&self, sql: &str) -> Result<RowStream, ExtractError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(ExtractError::Unavailable(self.root_missing())),
        }

        let parsed = ParsedQuery::parse(sql)?;
        let schema_path = self.schema_path(&parsed.table);
        let text = tokio::fs::read_to_string(&schema_path)
            .await
            .map_err(|e| schema_read_error(&parsed.table, &schema_path, &e))?;
        let schema = parse_schema(&schema_path, &text)?;
        let columns = parsed.resolve_columns(sql, &schema)?;
        let path = self.data_path(&parsed.table);

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(stream::empty::<Result<TableRow, ExtractError>>().boxed());
            }
            Err(e) => return Err(ExtractError::Io(format!("{}: {e}", path.display()))),
        };
        debug!(table = %parsed.table, path = %path.display(), "streaming table");

        let lines = tokio::io::BufReader::new(file).lines();
        let state = Some((lines, 0_usize));
        let rows = stream::unfold(state, move |state| {
            let columns = columns.clone();
            let path = path.clone();
            async move {
                let (mut lines, mut index) = state?;
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            index += 1;
                            match parse_line(&path, index - 1, &line) {
                                Ok(Some(row)) => {
                                    return Some((Ok(row.project(&columns)), Some((lines, index))));
                                }
                                Ok(None) => {}
                                Err(e) => return Some((Err(e), None)),
                            }
                        }
                        Ok(None) => return None,
                        Err(e) => {
                            let err = ExtractError::Io(format!("{}: {e}", path.display()));
                            return Some((Err(err), None));
                        }
                    }
                }
            }
        });
        Ok(rows.boxed())
    }
}

#[async_trait]
impl TableSink for LocalWarehouse {
    async fn write(&self, request: LoadRequest) -> Result<WriteResult, LoadError> {
        let warehouse = self.clone();
        tokio::task::spawn_blocking(move || warehouse.write_blocking(request))
            .await
            .map_err(|e| LoadError::Io(format!("write task failed: {e}")))?
    }
}
