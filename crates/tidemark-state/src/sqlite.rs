//! `SQLite`-backed implementation of [`StateBackend`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use tidemark_types::ids::{Partition, SourceName};
use tidemark_types::quality::QualityReport;
use tidemark_types::record::RejectedRecord;
use tidemark_types::run::{JobRunRow, RunCounters, RunStatus};
use tidemark_types::watermark::WatermarkState;

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS watermarks (
    source TEXT NOT NULL,
    partition TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (source, partition)
);

CREATE TABLE IF NOT EXISTS job_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    partition TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    records_processed INTEGER DEFAULT 0,
    records_inserted INTEGER DEFAULT 0,
    records_updated INTEGER DEFAULT 0,
    records_failed INTEGER DEFAULT 0,
    records_malformed INTEGER DEFAULT 0,
    duplicates_found INTEGER DEFAULT 0,
    bytes_written INTEGER DEFAULT 0,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS quality_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES job_runs(id),
    dataset TEXT NOT NULL,
    layer TEXT NOT NULL,
    total_records INTEGER NOT NULL,
    checks_json TEXT NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS rejected_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES job_runs(id),
    dedup_key TEXT NOT NULL,
    reason TEXT NOT NULL,
    cause TEXT NOT NULL,
    record_json TEXT NOT NULL,
    rejected_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_rejected_source_run ON rejected_records (source, run_id);
";

const RUN_COLUMNS: &str = "id, source, partition, status, started_at, finished_at, \
     records_processed, records_inserted, records_updated, records_failed, \
     records_malformed, duplicates_found, bytes_written, error_message";

/// `SQLite`-backed state storage.
///
/// Create with [`SqliteStateBackend::open`] for file-backed persistence
/// or [`SqliteStateBackend::in_memory`] for tests.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

impl SqliteStateBackend {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Format current UTC time for `SQLite` storage.
    fn now_sqlite() -> String {
        Utc::now().format(SQLITE_DATETIME_FMT).to_string()
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    #[allow(clippy::cast_sign_loss)]
    fn map_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRunRow> {
        let started_at: String = row.get(4)?;
        let finished_at: Option<String> = row.get(5)?;
        Ok(JobRunRow {
            run_id: row.get(0)?,
            source: row.get(1)?,
            partition: row.get(2)?,
            status: row.get(3)?,
            started_at: Self::sqlite_to_iso8601(&started_at),
            finished_at: finished_at.map(|raw| Self::sqlite_to_iso8601(&raw)),
            counters: RunCounters {
                records_processed: row.get::<_, i64>(6)? as u64,
                records_inserted: row.get::<_, i64>(7)? as u64,
                records_updated: row.get::<_, i64>(8)? as u64,
                records_failed: row.get::<_, i64>(9)? as u64,
                records_malformed: row.get::<_, i64>(10)? as u64,
                duplicates_found: row.get::<_, i64>(11)? as u64,
                bytes_written: row.get::<_, i64>(12)? as u64,
            },
            error_message: row.get(13)?,
        })
    }

    #[cfg(test)]
    fn get_run_row(
        &self,
        run_id: i64,
    ) -> error::Result<(String, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT status, records_processed, finished_at, error_message \
             FROM job_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(StateError::backend)
    }

    #[cfg(test)]
    fn count_rejected_for_run(&self, source: &SourceName, run_id: i64) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM rejected_records WHERE source = ?1 AND run_id = ?2",
            rusqlite::params![source.as_str(), run_id],
            |row| row.get(0),
        )
        .map_err(StateError::backend)
    }

    #[cfg(test)]
    fn first_rejected_reason(&self, source: &SourceName) -> error::Result<(String, String)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT dedup_key, reason FROM rejected_records \
             WHERE source = ?1 ORDER BY id LIMIT 1",
            rusqlite::params![source.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(StateError::backend)
    }

    #[cfg(test)]
    fn quality_row_for_run(&self, run_id: i64) -> error::Result<(String, String, i64, String)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT dataset, layer, total_records, checks_json \
             FROM quality_metrics WHERE run_id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(StateError::backend)
    }
}

impl StateBackend for SqliteStateBackend {
    fn get_watermark(
        &self,
        source: &SourceName,
        partition: &Partition,
    ) -> error::Result<Option<WatermarkState>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT value, updated_at FROM watermarks WHERE source = ?1 AND partition = ?2",
            rusqlite::params![source.as_str(), partition.as_str()],
            |row| {
                let value: String = row.get(0)?;
                let updated_at: String = row.get(1)?;
                Ok((value, updated_at))
            },
        );

        match result {
            Ok((value, updated_at)) => Ok(Some(WatermarkState {
                value,
                updated_at: Self::sqlite_to_iso8601(&updated_at),
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::backend(e)),
        }
    }

    fn advance_watermark(
        &self,
        source: &SourceName,
        partition: &Partition,
        expected: Option<&str>,
        new_value: &str,
    ) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let now = Self::now_sqlite();

        let rows_affected = match expected {
            Some(expected_val) => conn
                .execute(
                    "UPDATE watermarks SET value = ?1, updated_at = ?2 \
                     WHERE source = ?3 AND partition = ?4 AND value = ?5",
                    rusqlite::params![
                        new_value,
                        now,
                        source.as_str(),
                        partition.as_str(),
                        expected_val
                    ],
                )
                .map_err(StateError::backend)?,
            None => conn
                .execute(
                    "INSERT OR IGNORE INTO watermarks (source, partition, value, updated_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![source.as_str(), partition.as_str(), new_value, now],
                )
                .map_err(StateError::backend)?,
        };

        Ok(rows_affected > 0)
    }

    fn start_run(&self, source: &SourceName, partition: &Partition) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO job_runs (source, partition, status) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                source.as_str(),
                partition.as_str(),
                RunStatus::Pending.as_str()
            ],
        )
        .map_err(StateError::backend)?;
        Ok(conn.last_insert_rowid())
    }

    fn mark_running(&self, run_id: i64) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let rows = conn
            .execute(
                "UPDATE job_runs SET status = ?1 WHERE id = ?2 AND status = ?3",
                rusqlite::params![
                    RunStatus::Running.as_str(),
                    run_id,
                    RunStatus::Pending.as_str()
                ],
            )
            .map_err(StateError::backend)?;
        if rows == 0 {
            return Err(StateError::Backend {
                message: format!("mark_running: run {run_id} is not pending"),
                source: None,
            });
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
        error_message: Option<&str>,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let rows = conn
            .execute(
                "UPDATE job_runs SET status = ?1, finished_at = datetime('now'), \
                 records_processed = ?2, records_inserted = ?3, records_updated = ?4, \
                 records_failed = ?5, records_malformed = ?6, duplicates_found = ?7, \
                 bytes_written = ?8, error_message = ?9 \
                 WHERE id = ?10 AND status IN ('pending', 'running')",
                rusqlite::params![
                    status.as_str(),
                    counters.records_processed as i64,
                    counters.records_inserted as i64,
                    counters.records_updated as i64,
                    counters.records_failed as i64,
                    counters.records_malformed as i64,
                    counters.duplicates_found as i64,
                    counters.bytes_written as i64,
                    error_message,
                    run_id,
                ],
            )
            .map_err(StateError::backend)?;

        if rows == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM job_runs WHERE id = ?1)",
                    [run_id],
                    |row| row.get(0),
                )
                .map_err(StateError::backend)?;
            if exists {
                return Err(StateError::AlreadyFinalized { run_id });
            }
            return Err(StateError::Backend {
                message: format!("complete_run: unknown run {run_id}"),
                source: None,
            });
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn record_quality(&self, run_id: i64, report: &QualityReport) -> error::Result<()> {
        let checks_json = serde_json::to_string(&report.checks).map_err(|e| StateError::Backend {
            message: format!("record_quality: serialize checks: {e}"),
            source: None,
        })?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO quality_metrics (run_id, dataset, layer, total_records, checks_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                run_id,
                report.dataset,
                report.layer,
                report.total_records as i64,
                checks_json,
            ],
        )
        .map_err(|e| StateError::backend_context("record_quality: insert", e))?;
        Ok(())
    }

    fn insert_rejected(
        &self,
        source: &SourceName,
        run_id: i64,
        records: &[RejectedRecord],
    ) -> error::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("insert_rejected: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO rejected_records \
                 (source, run_id, dedup_key, reason, cause, record_json, rejected_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| StateError::backend_context("insert_rejected: prepare", e))?;

        let mut count = 0u64;
        for record in records {
            stmt.execute(rusqlite::params![
                source.as_str(),
                run_id,
                record.dedup_key,
                record.reason,
                record.cause.to_string(),
                record.record_json,
                record.rejected_at.as_str(),
            ])
            .map_err(|e| StateError::backend_context("insert_rejected: execute", e))?;
            count += 1;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::backend_context("insert_rejected: commit", e))?;

        Ok(count)
    }

    fn list_runs(&self, source: Option<&SourceName>, limit: u32) -> error::Result<Vec<JobRunRow>> {
        let conn = self.lock_conn()?;
        let mut runs = Vec::new();

        match source {
            Some(src) => {
                let sql = format!(
                    "SELECT {RUN_COLUMNS} FROM job_runs \
                     WHERE source = ?1 ORDER BY id DESC LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql).map_err(StateError::backend)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![src.as_str(), limit],
                        Self::map_run_row,
                    )
                    .map_err(StateError::backend)?;
                for row in rows {
                    runs.push(row.map_err(StateError::backend)?);
                }
            }
            None => {
                let sql = format!("SELECT {RUN_COLUMNS} FROM job_runs ORDER BY id DESC LIMIT ?1");
                let mut stmt = conn.prepare(&sql).map_err(StateError::backend)?;
                let rows = stmt
                    .query_map([limit], Self::map_run_row)
                    .map_err(StateError::backend)?;
                for row in rows {
                    runs.push(row.map_err(StateError::backend)?);
                }
            }
        }

        Ok(runs)
    }
}
