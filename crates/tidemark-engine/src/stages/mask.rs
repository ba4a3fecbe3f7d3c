//! PII masking stage.
//!
//! Applies the configured masking rules to every record before it can reach
//! the target. Masking is deterministic: the same input value under the same
//! salt always masks to the same output, so masked columns stay joinable
//! across runs.

use serde_json::Value;

use crate::config::types::{MaskRule, MaskStrategy, MaskingConfig};
use tidemark_types::record::{sha256_hex, Record, RejectedRecord, RejectionCause, Timestamp};

const REDACTED: &str = "[REDACTED]";

/// Outcome of masking one batch.
#[derive(Debug)]
pub struct MaskOutcome {
    pub records: Vec<Record>,
    /// Records dropped because a masked field held a non-string value.
    /// These are late contract violations, accounted separately from the
    /// validation stage's rejections.
    pub malformed: Vec<RejectedRecord>,
}

fn apply_rule(value: &str, rule: &MaskRule, salt: &str) -> String {
    match rule.strategy {
        MaskStrategy::Hash => sha256_hex(format!("{salt}{value}").as_bytes()),
        MaskStrategy::Redact => REDACTED.to_string(),
        MaskStrategy::Truncate => value.chars().take(rule.max_len).collect(),
    }
}

/// Mask one batch under the given rules.
///
/// Rules only touch fields that are present and non-null; an absent field is
/// not an error, the record simply has nothing to mask there. A present
/// non-string value in a masked field makes the record malformed: it is
/// dropped from the batch and reported for persistence.
///
/// Records whose payload changed get a fresh content hash so downstream
/// dedup ranks the masked payload, not the original.
#[must_use]
pub fn mask_batch(
    records: Vec<Record>,
    masking: &MaskingConfig,
    rejected_at: &Timestamp,
) -> MaskOutcome {
    if masking.rules.is_empty() {
        return MaskOutcome {
            records,
            malformed: Vec::new(),
        };
    }

    let mut kept = Vec::with_capacity(records.len());
    let mut malformed = Vec::new();

    'record: for mut record in records {
        let mut changed = false;

        for rule in &masking.rules {
            let masked = match record.payload.get(rule.field.as_str()) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => {
                    let out = apply_rule(s, rule, &masking.salt);
                    (out != *s).then_some(out)
                }
                Some(other) => {
                    let reason = format!(
                        "masked field '{}' holds non-string value of type {}",
                        rule.field,
                        json_type_name(other)
                    );
                    malformed.push(RejectedRecord {
                        dedup_key: record.dedup_key.clone(),
                        reason,
                        cause: RejectionCause::Malformed,
                        record_json: Value::Object(record.payload.clone()).to_string(),
                        rejected_at: rejected_at.clone(),
                    });
                    continue 'record;
                }
            };

            if let Some(value) = masked {
                record.payload.insert(rule.field.clone(), Value::String(value));
                changed = true;
            }
        }

        if changed {
            record.rehash();
        }
        kept.push(record);
    }

    MaskOutcome {
        records: kept,
        malformed,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
