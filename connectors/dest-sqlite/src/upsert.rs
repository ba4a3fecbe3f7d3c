//! Blocking upsert path: open, prepare the target table, write one
//! transaction per batch.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tidemark_engine::load::{LoadReport, RowFailure};
use tidemark_types::error::StageError;
use tidemark_types::record::{canonical_json, Record};
use tracing::warn;

/// Quote an identifier for use in SQLite DDL/DML.
///
/// Target table names come from user configuration, so they may carry
/// characters that are not bare-identifier safe.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn open_db(path: &Path) -> Result<Connection, StageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StageError::transient_io("load", &e))?;
    }
    Connection::open(path)
        .map_err(|e| StageError::transient("load", format!("failed to open {}: {e}", path.display())))
}

fn ensure_table(conn: &Connection, table: &str) -> Result<(), StageError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            business_key TEXT PRIMARY KEY,
            business_ts TEXT,
            content_hash TEXT,
            payload TEXT,
            loaded_at TEXT
        )"
    ))
    .map_err(|e| StageError::transient("load", format!("failed to prepare target table: {e}")))
}

/// Upsert a batch of records into `target`, one transaction per call.
///
/// Rows are keyed by `dedup_key`. A row with an empty key, or a row the
/// database rejects, becomes a [`RowFailure`] while the remaining rows
/// proceed. Errors opening the database or committing the transaction
/// fail the whole call and are retryable.
pub(crate) fn load_rows(
    path: &Path,
    target: &str,
    records: &[Record],
) -> Result<LoadReport, StageError> {
    let mut conn = open_db(path)?;
    let table = quote_ident(target);
    ensure_table(&conn, &table)?;

    let tx = conn
        .transaction()
        .map_err(|e| StageError::transient("load", format!("failed to begin transaction: {e}")))?;

    let mut report = LoadReport::default();
    let loaded_at = now_iso();
    {
        let mut exists = tx
            .prepare(&format!("SELECT 1 FROM {table} WHERE business_key = ?1"))
            .map_err(|e| StageError::transient("load", e.to_string()))?;
        let mut upsert = tx
            .prepare(&format!(
                "INSERT INTO {table} (business_key, business_ts, content_hash, payload, loaded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(business_key) DO UPDATE SET \
                 business_ts = excluded.business_ts, \
                 content_hash = excluded.content_hash, \
                 payload = excluded.payload, \
                 loaded_at = excluded.loaded_at"
            ))
            .map_err(|e| StageError::transient("load", e.to_string()))?;

        for record in records {
            if record.dedup_key.is_empty() {
                report.failures.push(RowFailure {
                    dedup_key: String::new(),
                    message: "record has no business key".to_string(),
                });
                continue;
            }
            let existed = match exists.exists(params![record.dedup_key]) {
                Ok(existed) => existed,
                Err(e) => {
                    warn!(key = %record.dedup_key, error = %e, "existence check failed");
                    report.failures.push(RowFailure {
                        dedup_key: record.dedup_key.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let payload_json = canonical_json(&record.payload);
            match upsert.execute(params![
                record.dedup_key,
                record.business_timestamp.as_str(),
                record.content_hash,
                payload_json,
                loaded_at,
            ]) {
                Ok(_) => {
                    if existed {
                        report.updated += 1;
                    } else {
                        report.inserted += 1;
                    }
                    report.bytes_written += payload_json.len() as u64;
                }
                Err(e) => {
                    warn!(key = %record.dedup_key, error = %e, "row upsert failed");
                    report.failures.push(RowFailure {
                        dedup_key: record.dedup_key.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    tx.commit()
        .map_err(|e| StageError::transient("load", format!("commit failed: {e}")))?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
