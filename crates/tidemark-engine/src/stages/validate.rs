//! Contract validation stage.
//!
//! Checks every record against the source contract and decides whether the
//! batch as a whole is healthy enough to continue. Individual bad records are
//! rejected; a rejection rate above the configured threshold gates the whole
//! run so a broken upstream cannot poison the target.

use serde_json::Value;

use tidemark_types::record::{Record, RejectedRecord, RejectionCause, Timestamp};

/// Outcome of validating one batch.
#[derive(Debug)]
pub enum ValidationVerdict {
    /// Rejection rate within tolerance. Passing records continue downstream,
    /// rejected ones are persisted for inspection.
    Passed {
        records: Vec<Record>,
        rejected: Vec<RejectedRecord>,
    },
    /// Rejection rate breached the threshold. Nothing continues downstream;
    /// rejected records are still persisted so the breach can be diagnosed.
    Gated {
        rejected: Vec<RejectedRecord>,
        rejected_count: u64,
        total: u64,
        threshold_pct: f64,
    },
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn reject(record: &Record, reason: String, cause: RejectionCause, rejected_at: &Timestamp) -> RejectedRecord {
    RejectedRecord {
        dedup_key: record.dedup_key.clone(),
        reason,
        cause,
        record_json: Value::Object(record.payload.clone()).to_string(),
        rejected_at: rejected_at.clone(),
    }
}

/// Validate a batch against its contract.
///
/// A required field passes when it is present and non-null; empty strings are
/// a data quality concern, not a contract breach. The watermark column must
/// additionally hold a scalar value, otherwise record ordering is undefined.
///
/// The gate is strict: a batch fails only when the rejection rate exceeds
/// `threshold_pct`, so a rate exactly at the threshold still passes.
#[must_use]
pub fn validate_batch(
    records: Vec<Record>,
    required: &[String],
    watermark_column: &str,
    threshold_pct: f64,
    rejected_at: &Timestamp,
) -> ValidationVerdict {
    let total = records.len() as u64;
    let mut passed = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for record in records {
        let missing: Vec<&str> = required
            .iter()
            .filter(|field| {
                record
                    .payload
                    .get(field.as_str())
                    .map_or(true, Value::is_null)
            })
            .map(String::as_str)
            .collect();

        let watermark_mismatch = record
            .payload
            .get(watermark_column)
            .is_some_and(|v| !is_scalar(v));

        if !missing.is_empty() {
            let mut reason = format!("missing required field(s): {}", missing.join(", "));
            if watermark_mismatch {
                reason.push_str(&format!(
                    "; watermark column '{watermark_column}' holds a non-scalar value"
                ));
            }
            rejected.push(reject(&record, reason, RejectionCause::MissingField, rejected_at));
        } else if watermark_mismatch {
            let reason =
                format!("watermark column '{watermark_column}' holds a non-scalar value");
            rejected.push(reject(&record, reason, RejectionCause::TypeMismatch, rejected_at));
        } else {
            passed.push(record);
        }
    }

    let rejected_count = rejected.len() as u64;
    #[allow(clippy::cast_precision_loss)]
    let rate_pct = if total == 0 {
        0.0
    } else {
        rejected_count as f64 / total as f64 * 100.0
    };

    if rate_pct > threshold_pct {
        ValidationVerdict::Gated {
            rejected,
            rejected_count,
            total,
            threshold_pct,
        }
    } else {
        ValidationVerdict::Passed {
            records: passed,
            rejected,
        }
    }
}
