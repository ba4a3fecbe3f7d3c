//! Run lifecycle types.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a partition run.
///
/// Runs move `pending -> running -> {success | failed | partial}`.
/// Terminal states are immutable; the state backend refuses a second
/// finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Some rows loaded and the watermark advanced, but per-row
    /// failures were recorded.
    Partial,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Partial)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters accumulated over one partition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Records extracted into the batch.
    pub records_processed: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    /// Records rejected by validation plus rows that failed to load.
    pub records_failed: u64,
    /// Records dropped by later stages after passing validation.
    pub records_malformed: u64,
    pub duplicates_found: u64,
    pub bytes_written: u64,
}

/// One row of run history as stored by the state backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunRow {
    pub run_id: i64,
    pub source: String,
    pub partition: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub error_message: Option<String>,
}
