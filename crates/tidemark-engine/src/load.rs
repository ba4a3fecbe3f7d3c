//! Load seam between the engine and destination connectors.

use async_trait::async_trait;

use tidemark_types::error::StageError;
use tidemark_types::record::Record;

/// One row the destination could not upsert.
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub dedup_key: String,
    pub message: String,
}

/// Per-call load accounting.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub inserted: u64,
    pub updated: u64,
    pub failures: Vec<RowFailure>,
    pub bytes_written: u64,
}

impl LoadReport {
    #[must_use]
    pub fn rows_attempted(&self) -> u64 {
        self.inserted + self.updated + self.failures.len() as u64
    }

    #[must_use]
    pub fn all_rows_failed(&self) -> bool {
        !self.failures.is_empty() && self.inserted == 0 && self.updated == 0
    }
}

/// Destination connector lifecycle.
///
/// Implementations upsert by business identity: a record whose dedup key
/// already exists in the target replaces the stored row instead of creating
/// a second one. Reloading the same batch must leave the target unchanged.
///
/// Row-level failures are reported inside `Ok(LoadReport)` so the engine can
/// account for the rows that did land. `Err` is reserved for batch-level
/// faults where no per-row accounting is possible.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Upsert a batch of records into the named target.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when the destination rejects the whole batch,
    /// e.g. the target is unreachable or a transaction cannot be opened.
    async fn load(&self, target: &str, records: &[Record]) -> Result<LoadReport, StageError>;
}
