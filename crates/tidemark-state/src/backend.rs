//! State backend trait definition.
//!
//! [`StateBackend`] defines the storage contract for watermarks, run
//! history, quality metrics, and rejected records. Model types live in
//! [`tidemark_types`].

use tidemark_types::ids::{Partition, SourceName};
use tidemark_types::quality::QualityReport;
use tidemark_types::record::RejectedRecord;
use tidemark_types::run::{JobRunRow, RunCounters, RunStatus};
use tidemark_types::watermark::WatermarkState;

use crate::error;

/// Storage contract for ingestion state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateBackend>`.
/// All methods are synchronous; async callers wrap them in blocking tasks.
pub trait StateBackend: Send + Sync {
    /// Read the watermark for a (source, partition) pair.
    ///
    /// Returns `Ok(None)` when the partition has never completed a run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_watermark(
        &self,
        source: &SourceName,
        partition: &Partition,
    ) -> error::Result<Option<WatermarkState>>;

    /// Compare-and-set watermark advance.
    ///
    /// Applies `new_value` only if the stored value still matches
    /// `expected`, and returns whether the update was applied. When
    /// `expected` is `None`, succeeds only if no watermark exists yet
    /// (insert-if-absent). A `false` return means a concurrent run
    /// advanced the watermark first; the caller must not treat its own
    /// output as durable progress.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn advance_watermark(
        &self,
        source: &SourceName,
        partition: &Partition,
        expected: Option<&str>,
        new_value: &str,
    ) -> error::Result<bool>;

    /// Create a new run in `pending` state, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, source: &SourceName, partition: &Partition) -> error::Result<i64>;

    /// Transition a `pending` run to `running`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage
    /// failure or when the run is not in `pending` state.
    fn mark_running(&self, run_id: i64) -> error::Result<()>;

    /// Finalize a run with a terminal status, counters, and an optional
    /// error message. Terminal states are immutable: finalizing the
    /// same run twice fails with
    /// [`StateError::AlreadyFinalized`](crate::error::StateError::AlreadyFinalized).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage
    /// failure or repeated finalization.
    fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
        error_message: Option<&str>,
    ) -> error::Result<()>;

    /// Persist the quality report for a run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn record_quality(&self, run_id: i64, report: &QualityReport) -> error::Result<()>;

    /// Persist rejected records. Returns the count inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_rejected(
        &self,
        source: &SourceName,
        run_id: i64,
        records: &[RejectedRecord],
    ) -> error::Result<u64>;

    /// Read run history, newest first, optionally filtered by source.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_runs(&self, source: Option<&SourceName>, limit: u32) -> error::Result<Vec<JobRunRow>>;
}
