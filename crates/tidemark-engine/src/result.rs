//! Run outcome types surfaced to callers of the engine.

use serde::Serialize;

use tidemark_types::ids::{Partition, SourceName};
use tidemark_types::run::{RunCounters, RunStatus};

/// Final accounting for one partition run.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub source: SourceName,
    pub partition: Partition,
    pub run_id: i64,
    pub status: RunStatus,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub watermark_before: Option<String>,
    pub watermark_after: Option<String>,
    /// Source lines that could not be parsed at extraction time.
    pub lines_skipped: u64,
    pub extract_attempts: u32,
    pub load_attempts: u32,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PartitionSummary {
    /// True when the watermark moved during this run.
    #[must_use]
    pub fn advanced(&self) -> bool {
        self.watermark_after != self.watermark_before
    }
}

/// A partition whose run hit an infrastructure fault before it could be
/// finalized through the normal lifecycle.
#[derive(Debug, Serialize)]
pub struct PartitionFailure {
    pub partition: Partition,
    pub error: String,
}

/// Aggregated outcome across every partition of one source run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub source: SourceName,
    pub partitions: Vec<PartitionSummary>,
    pub failures: Vec<PartitionFailure>,
}

impl RunReport {
    /// True when no partition failed. Partial loads count as success here;
    /// their row failures are visible in the counters and run history.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failures.is_empty()
            && self
                .partitions
                .iter()
                .all(|p| p.status != RunStatus::Failed)
    }

    /// Counters summed over all finalized partitions.
    #[must_use]
    pub fn totals(&self) -> RunCounters {
        let mut totals = RunCounters::default();
        for p in &self.partitions {
            totals.records_processed += p.counters.records_processed;
            totals.records_inserted += p.counters.records_inserted;
            totals.records_updated += p.counters.records_updated;
            totals.records_failed += p.counters.records_failed;
            totals.records_malformed += p.counters.records_malformed;
            totals.duplicates_found += p.counters.duplicates_found;
            totals.bytes_written += p.counters.bytes_written;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(status: RunStatus, inserted: u64) -> PartitionSummary {
        PartitionSummary {
            source: SourceName::new("orders"),
            partition: Partition::default(),
            run_id: 1,
            status,
            counters: RunCounters {
                records_inserted: inserted,
                ..RunCounters::default()
            },
            watermark_before: None,
            watermark_after: Some("2024-06-01T00:00:00Z".to_string()),
            lines_skipped: 0,
            extract_attempts: 1,
            load_attempts: 1,
            duration_secs: 0.2,
            error_message: None,
        }
    }

    #[test]
    fn partial_counts_as_overall_success() {
        let report = RunReport {
            source: SourceName::new("orders"),
            partitions: vec![summary(RunStatus::Success, 10), summary(RunStatus::Partial, 5)],
            failures: Vec::new(),
        };
        assert!(report.success());
        assert_eq!(report.totals().records_inserted, 15);
    }

    #[test]
    fn failed_partition_fails_the_report() {
        let report = RunReport {
            source: SourceName::new("orders"),
            partitions: vec![summary(RunStatus::Failed, 0)],
            failures: Vec::new(),
        };
        assert!(!report.success());
    }

    #[test]
    fn infrastructure_failure_fails_the_report() {
        let report = RunReport {
            source: SourceName::new("orders"),
            partitions: Vec::new(),
            failures: vec![PartitionFailure {
                partition: Partition::new("region=eu"),
                error: "state database unavailable".to_string(),
            }],
        };
        assert!(!report.success());
    }

    #[test]
    fn advanced_compares_watermarks() {
        let mut s = summary(RunStatus::Success, 1);
        assert!(s.advanced());
        s.watermark_before.clone_from(&s.watermark_after);
        assert!(!s.advanced());
    }
}
