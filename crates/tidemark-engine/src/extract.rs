//! Extraction seam between the engine and source connectors.

use async_trait::async_trait;

use tidemark_types::error::StageError;
use tidemark_types::ids::{Partition, SourceName};
use tidemark_types::record::Batch;

/// Bounded extraction request for one partition of one source.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub source: SourceName,
    pub partition: Partition,
    /// Highest watermark already ingested for this partition.
    /// `None` means no run has ever completed: full initial load.
    pub watermark: Option<String>,
    pub batch_size: usize,
    pub watermark_column: String,
    pub dedup_key_field: String,
}

/// Outcome of one extraction call.
#[derive(Debug)]
pub enum ExtractOutcome {
    /// At least one record strictly newer than the request watermark.
    Batch(Batch),
    /// Nothing newer than the watermark exists at the source.
    Empty,
}

impl ExtractOutcome {
    #[must_use]
    pub fn record_count(&self) -> usize {
        match self {
            Self::Batch(batch) => batch.len(),
            Self::Empty => 0,
        }
    }
}

/// Source connector lifecycle.
///
/// Implementations return records strictly newer than the request watermark,
/// ordered ascending by watermark value, capped at `batch_size`. A source
/// with nothing new reports [`ExtractOutcome::Empty`] rather than an empty
/// batch, so callers can skip the transform and load stages outright.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Read the next batch for one partition.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when the source cannot be read. Transient
    /// errors are retried by the engine according to its retry policy.
    async fn extract(&self, req: &ExtractRequest) -> Result<ExtractOutcome, StageError>;
}
