//! Lineage event payloads.
//!
//! Events follow the common run-event shape used by lineage collectors:
//! camelCase fields, `START`/`COMPLETE`/`FAIL` event types, and output
//! statistics attached to `COMPLETE`.

use serde::{Deserialize, Serialize};

use crate::ids::{Partition, SourceName};
use crate::record::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageEventType {
    Start,
    Complete,
    Fail,
}

impl std::fmt::Display for LineageEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "START",
            Self::Complete => "COMPLETE",
            Self::Fail => "FAIL",
        };
        write!(f, "{s}")
    }
}

/// Reference to a dataset on either side of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub namespace: String,
    pub name: String,
}

impl DatasetRef {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Output volume statistics attached to `COMPLETE` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStats {
    pub row_count: u64,
    pub bytes: u64,
}

/// One lineage event for a partition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEvent {
    pub event_type: LineageEventType,
    pub event_time: Timestamp,
    pub run_id: i64,
    pub source: SourceName,
    pub partition: Partition,
    pub input: DatasetRef,
    pub output: DatasetRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_stats: Option<OutputStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LineageEvent {
    #[must_use]
    pub fn start(
        run_id: i64,
        source: SourceName,
        partition: Partition,
        input: DatasetRef,
        output: DatasetRef,
        event_time: Timestamp,
    ) -> Self {
        Self {
            event_type: LineageEventType::Start,
            event_time,
            run_id,
            source,
            partition,
            input,
            output,
            output_stats: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn complete(
        run_id: i64,
        source: SourceName,
        partition: Partition,
        input: DatasetRef,
        output: DatasetRef,
        stats: OutputStats,
        event_time: Timestamp,
    ) -> Self {
        Self {
            event_type: LineageEventType::Complete,
            event_time,
            run_id,
            source,
            partition,
            input,
            output,
            output_stats: Some(stats),
            error_message: None,
        }
    }

    #[must_use]
    pub fn fail(
        run_id: i64,
        source: SourceName,
        partition: Partition,
        input: DatasetRef,
        output: DatasetRef,
        error: impl Into<String>,
        event_time: Timestamp,
    ) -> Self {
        Self {
            event_type: LineageEventType::Fail,
            event_time,
            run_id,
            source,
            partition,
            input,
            output,
            output_stats: None,
            error_message: Some(error.into()),
        }
    }
}
