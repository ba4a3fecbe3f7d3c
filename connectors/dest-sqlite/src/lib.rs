//! SQLite warehouse destination.
//!
//! Loads records into a per-target table keyed by business identity.
//! Re-loading the same key overwrites the stored row, so replayed
//! batches converge instead of duplicating. The table is created on
//! first use:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS <target> (
//!     business_key TEXT PRIMARY KEY,
//!     business_ts  TEXT,
//!     content_hash TEXT,
//!     payload      TEXT,
//!     loaded_at    TEXT
//! )
//! ```
//!
//! The connection is opened inside each [`Loader::load`] call, so an
//! unreachable database file surfaces as a retryable error rather than
//! a construction failure.

mod upsert;

use std::path::PathBuf;

use async_trait::async_trait;
use tidemark_engine::config::types::LoadConfig;
use tidemark_engine::load::{LoadReport, Loader};
use tidemark_types::error::StageError;
use tidemark_types::record::Record;
use tracing::debug;

/// Loader writing to a local SQLite database file.
pub struct SqliteLoader {
    path: PathBuf,
}

impl SqliteLoader {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn from_config(config: &LoadConfig) -> Self {
        Self::new(config.path.clone())
    }
}

#[async_trait]
impl Loader for SqliteLoader {
    async fn load(&self, target: &str, records: &[Record]) -> Result<LoadReport, StageError> {
        let path = self.path.clone();
        let table = target.to_string();
        let rows = records.to_vec();
        let report = tokio::task::spawn_blocking(move || upsert::load_rows(&path, &table, &rows))
            .await
            .map_err(|e| StageError::system("load", format!("load task panicked: {e}")))??;
        debug!(
            table = %target,
            inserted = report.inserted,
            updated = report.updated,
            row_failures = report.failures.len(),
            "batch loaded"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
