//! Run error model and retry backoff policy helpers.

use std::time::Duration;

use tidemark_types::error::{BackoffClass, StageError};

const BACKOFF_FAST_BASE_MS: u64 = 100;
const BACKOFF_NORMAL_BASE_MS: u64 = 1_000;
const BACKOFF_SLOW_BASE_MS: u64 = 5_000;
const BACKOFF_MAX_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// PipelineError — categorised errors for retry decisions
// ---------------------------------------------------------------------------

/// Categorized run error for retry decisions.
///
/// `Stage` wraps a typed [`StageError`] with retry metadata
/// (`retryable`, `backoff_class`, `retry_after_ms`, etc.).
///
/// `Infrastructure` wraps opaque host-side errors (state backend
/// failures, task panics, etc.) that are never retryable.
#[derive(Debug)]
pub enum PipelineError {
    /// Typed stage error with retry metadata.
    Stage(StageError),
    /// Infrastructure error (state backend, task join, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage(e) => write!(f, "{e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<StageError> for PipelineError {
    fn from(e: StageError) -> Self {
        Self::Stage(e)
    }
}

impl PipelineError {
    /// Returns `true` if this is a typed stage error marked retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stage(e) => e.retryable,
            Self::Infrastructure(_) => false,
        }
    }

    /// Returns the typed stage error if this is a `Stage` variant.
    #[must_use]
    pub fn as_stage_error(&self) -> Option<&StageError> {
        match self {
            Self::Stage(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }
}

/// Compute retry delay based on error hints and attempt number.
pub(crate) fn compute_backoff(err: &StageError, attempt: u32) -> Duration {
    // An explicit retry_after from the failing system wins.
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms: u64 = match err.backoff_class {
        BackoffClass::Fast => BACKOFF_FAST_BASE_MS,
        BackoffClass::Normal => BACKOFF_NORMAL_BASE_MS,
        BackoffClass::Slow => BACKOFF_SLOW_BASE_MS,
    };

    let delay_ms = base_ms.saturating_mul(2u64.pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}
