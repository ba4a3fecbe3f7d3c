//! Structured stage errors.
//!
//! Every stage of a run reports failures as a [`StageError`] so the
//! orchestrator can make retry decisions without string matching. The
//! error is serializable and crosses task boundaries intact.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifies a stage failure. The kind drives orchestration policy:
/// only [`ErrorKind::Transient`] failures are retried, and only at the
/// extract and load stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Temporary infrastructure failure (IO, timeout on an edge stage).
    Transient,
    /// A record or batch violated the source contract.
    Contract,
    /// The rejection rate crossed the configured threshold.
    HardGate,
    /// A concurrent run advanced the watermark first.
    Conflict,
    /// Some rows loaded, some did not.
    PartialLoad,
    /// Internal invariant violation or non-retryable infrastructure error.
    System,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Contract => "contract",
            Self::HardGate => "hard_gate",
            Self::Conflict => "conflict",
            Self::PartialLoad => "partial_load",
            Self::System => "system",
        };
        write!(f, "{s}")
    }
}

/// How much of the run a failure affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    /// A single record; the rest of the batch is unaffected.
    Record,
    /// The whole extracted batch.
    Batch,
    /// The partition run as a whole.
    Run,
}

/// Suggested backoff aggressiveness for retryable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    Fast,
    Normal,
    Slow,
}

/// A structured error raised by one stage of a partition run.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{kind}] {stage}: {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub scope: ErrorScope,
    /// Stage that raised the error: `extract`, `validate`, `mask`,
    /// `dedup`, `load`, or `state`.
    pub stage: String,
    pub message: String,
    pub retryable: bool,
    pub backoff_class: BackoffClass,
    /// Explicit delay requested by the failing system, overriding the
    /// backoff class when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StageError {
    /// Retryable infrastructure failure at a stage boundary.
    #[must_use]
    pub fn transient(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            scope: ErrorScope::Run,
            stage: stage.into(),
            message: message.into(),
            retryable: true,
            backoff_class: BackoffClass::Normal,
            retry_after_ms: None,
            details: None,
        }
    }

    /// Transient error wrapping an IO failure.
    #[must_use]
    pub fn transient_io(stage: impl Into<String>, err: &std::io::Error) -> Self {
        Self::transient(stage, format!("io error: {err}"))
    }

    /// A stage exceeded its configured deadline. Timeouts on the extract
    /// and load edges are retryable; elsewhere callers convert to
    /// [`StageError::system`].
    #[must_use]
    pub fn timeout(stage: impl Into<String>, elapsed_secs: u64) -> Self {
        Self {
            kind: ErrorKind::Transient,
            scope: ErrorScope::Run,
            stage: stage.into(),
            message: format!("stage timed out after {elapsed_secs}s"),
            retryable: true,
            backoff_class: BackoffClass::Slow,
            retry_after_ms: None,
            details: None,
        }
    }

    /// A single record failed contract validation.
    #[must_use]
    pub fn contract(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Contract,
            scope: ErrorScope::Record,
            stage: stage.into(),
            message: message.into(),
            retryable: false,
            backoff_class: BackoffClass::Normal,
            retry_after_ms: None,
            details: None,
        }
    }

    /// The batch rejection rate crossed the threshold. Never retryable:
    /// the same input would fail again.
    #[must_use]
    pub fn hard_gate(rejected: u64, total: u64, threshold_pct: f64) -> Self {
        Self {
            kind: ErrorKind::HardGate,
            scope: ErrorScope::Batch,
            stage: "validate".to_string(),
            message: format!(
                "rejection rate {rejected}/{total} exceeds threshold {threshold_pct}%"
            ),
            retryable: false,
            backoff_class: BackoffClass::Normal,
            retry_after_ms: None,
            details: None,
        }
    }

    /// Watermark advance lost a compare-and-set race to a concurrent run.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            scope: ErrorScope::Run,
            stage: "state".to_string(),
            message: message.into(),
            retryable: false,
            backoff_class: BackoffClass::Normal,
            retry_after_ms: None,
            details: None,
        }
    }

    /// Some rows failed to load after load-stage retries were exhausted.
    #[must_use]
    pub fn partial_load(failed: u64, total: u64) -> Self {
        Self {
            kind: ErrorKind::PartialLoad,
            scope: ErrorScope::Batch,
            stage: "load".to_string(),
            message: format!("{failed} of {total} rows failed to load"),
            retryable: false,
            backoff_class: BackoffClass::Normal,
            retry_after_ms: None,
            details: None,
        }
    }

    /// Non-retryable internal failure.
    #[must_use]
    pub fn system(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::System,
            scope: ErrorScope::Run,
            stage: stage.into(),
            message: message.into(),
            retryable: false,
            backoff_class: BackoffClass::Normal,
            retry_after_ms: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: ErrorScope) -> Self {
        self.scope = scope;
        self
    }
}
