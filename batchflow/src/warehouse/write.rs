//! Write semantics shared by the local warehouses.

use super::{CreateDisposition, FailedInsert, LoadRequest, TableReference, WriteDisposition, WriteResult};
use crate::errors::LoadError;
use crate::records::{TableRow, TableSchema};
use sha2::{Digest, Sha256};

/// How the accepted rows land in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// The accepted rows become the whole table.
    Replace,
    /// The accepted rows are added after the existing ones.
    Append,
    /// Nothing was accepted; the destination is neither created nor cleared.
    Untouched,
}

/// A checked write, ready to apply.
#[derive(Debug)]
pub(crate) struct WritePlan {
    pub destination: TableReference,
    pub schema: TableSchema,
    pub rows: Vec<TableRow>,
    pub mode: WriteMode,
    pub result: WriteResult,
}

/// Applies dispositions and per-row validation to `request`.
///
/// `existing_rows` is `None` when the destination does not exist, otherwise
/// the number of rows it currently holds. Only `WriteEmpty` looks at the
/// count, so sinks may pass `Some(0)` for other dispositions. `reject` lets
/// a sink refuse rows for its own reasons on top of schema validation.
///
/// A request whose rows are all refused commits nothing: the plan is
/// [`WriteMode::Untouched`] and `successful_loads` is empty, so a truncate
/// never clears a table it did not refill. An empty request still commits.
pub(crate) fn plan_write<F>(
    request: LoadRequest,
    existing_rows: Option<usize>,
    reject: F,
) -> Result<WritePlan, LoadError>
where
    F: Fn(&TableRow) -> Option<String>,
{
    let LoadRequest {
        destination,
        schema,
        rows,
        write_disposition,
        create_disposition,
    } = request;

    match (existing_rows, create_disposition) {
        (None, CreateDisposition::CreateNever) => {
            return Err(LoadError::TableNotFound(destination.to_string()));
        }
        (Some(n), _) if n > 0 && write_disposition == WriteDisposition::WriteEmpty => {
            return Err(LoadError::TableNotEmpty(destination.to_string()));
        }
        _ => {}
    }

    let requested = rows.len();
    let mut accepted = Vec::with_capacity(requested);
    let mut failed_inserts = Vec::new();
    for row in rows {
        let refusal = schema
            .validate_row(&row)
            .err()
            .map(|e| e.to_string())
            .or_else(|| reject(&row));
        match refusal {
            Some(reason) => failed_inserts.push(FailedInsert { row, reason }),
            None => accepted.push(row),
        }
    }

    let committed = !accepted.is_empty() || requested == 0;
    let result = WriteResult {
        successful_loads: if committed {
            vec![destination.clone()]
        } else {
            Vec::new()
        },
        failed_inserts,
        rows_written: accepted.len() as u64,
    };

    let mode = match write_disposition {
        _ if !committed => WriteMode::Untouched,
        WriteDisposition::WriteAppend => WriteMode::Append,
        WriteDisposition::WriteTruncate | WriteDisposition::WriteEmpty => WriteMode::Replace,
    };

    Ok(WritePlan {
        destination,
        schema,
        rows: accepted,
        mode,
        result,
    })
}

/// Order-independent SHA-256 digest of a table's rows, hex encoded.
#[must_use]
pub fn fingerprint_rows(rows: &[TableRow]) -> String {
    let mut lines: Vec<String> = rows
        .iter()
        .map(|row| serde_json::to_string(row).unwrap_or_default())
        .collect();
    lines.sort_unstable();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
