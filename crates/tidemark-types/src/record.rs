//! Records, batches, and the rejected-record envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ids::{Partition, SourceName};

/// A record payload: top-level JSON object fields.
///
/// `serde_json::Map` keeps keys sorted, so serializing a payload always
/// yields the same bytes for the same logical content. Content hashes
/// depend on this.
pub type Payload = serde_json::Map<String, Value>;

/// ISO-8601 timestamp carried as a string.
///
/// Timestamps are compared lexicographically, which is correct for
/// normalized UTC ISO-8601 strings. The engine never parses them; it
/// only compares and stores them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub String);

impl Timestamp {
    #[must_use]
    pub fn new(ts: impl Into<String>) -> Self {
        Self(ts.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One record moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub payload: Payload,
    /// Business identity used for deduplication and upsert. Empty when
    /// the source payload is missing the configured key field; such
    /// records surface as row failures at load time.
    pub dedup_key: String,
    /// Value of the watermark column, used for watermark advancement.
    pub business_timestamp: Timestamp,
    /// SHA-256 of the canonical payload serialization.
    pub content_hash: String,
    /// Canonical serialized size. A dedup tie-breaker only.
    pub size_bytes: u64,
    /// Position in extraction order within the batch. Later ordinals
    /// are considered more recent during deduplication.
    pub source_ordinal: u64,
}

impl Record {
    /// Builds a record from a raw payload, extracting the dedup key and
    /// business timestamp from the named fields. Missing fields become
    /// empty strings rather than errors; downstream stages decide what
    /// to do with them.
    #[must_use]
    pub fn from_payload(
        payload: Payload,
        key_field: &str,
        watermark_column: &str,
        source_ordinal: u64,
    ) -> Self {
        let dedup_key = field_as_string(&payload, key_field).unwrap_or_default();
        let business_timestamp =
            Timestamp::new(field_as_string(&payload, watermark_column).unwrap_or_default());
        let canonical = canonical_json(&payload);
        Self {
            dedup_key,
            business_timestamp,
            content_hash: sha256_hex(canonical.as_bytes()),
            size_bytes: canonical.len() as u64,
            payload,
            source_ordinal,
        }
    }

    /// Recomputes `content_hash` and `size_bytes` after the payload was
    /// mutated (e.g. by masking).
    pub fn rehash(&mut self) {
        let canonical = canonical_json(&self.payload);
        self.content_hash = sha256_hex(canonical.as_bytes());
        self.size_bytes = canonical.len() as u64;
    }

    /// Number of top-level payload fields carrying a real value.
    #[must_use]
    pub fn populated_field_count(&self) -> usize {
        self.payload.values().filter(|v| is_populated(v)).count()
    }
}

/// Canonical serialization of a payload: JSON with sorted keys.
#[must_use]
pub fn canonical_json(payload: &Payload) -> String {
    // Map keys are already sorted; to_string is infallible for Value trees.
    serde_json::to_string(payload).unwrap_or_default()
}

/// Lowercase hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Whether a JSON value counts as populated: not null, not an empty
/// string, not an empty array or object.
#[must_use]
pub fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Reads a top-level payload field as a string. Non-string scalars are
/// rendered with their JSON representation; null and missing fields
/// return `None`.
#[must_use]
pub fn field_as_string(payload: &Payload, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A bounded set of records extracted from one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub source: SourceName,
    pub partition: Partition,
    pub records: Vec<Record>,
    /// Highest business timestamp in the batch; the watermark candidate
    /// once the batch loads.
    pub max_watermark: Timestamp,
    /// Source lines that could not be parsed and were skipped.
    pub lines_skipped: u64,
}

impl Batch {
    /// Builds a batch, computing `max_watermark` from the records.
    /// Callers hand over at least one record; empty extractions are
    /// reported as an explicit empty outcome instead of an empty batch.
    #[must_use]
    pub fn new(
        source: SourceName,
        partition: Partition,
        records: Vec<Record>,
        lines_skipped: u64,
    ) -> Self {
        let max_watermark = records
            .iter()
            .map(|r| r.business_timestamp.clone())
            .max()
            .unwrap_or_else(|| Timestamp::new(""));
        Self {
            source,
            partition,
            records,
            max_watermark,
            lines_skipped,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Why a record was rejected at some stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCause {
    /// A required field is absent or null.
    MissingField,
    /// A field is present but holds an unusable type.
    TypeMismatch,
    /// The record broke during a later stage (e.g. masking found a
    /// non-string value where one was required).
    Malformed,
    /// The destination refused the row.
    LoadFailure,
}

impl std::fmt::Display for RejectionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingField => "missing_field",
            Self::TypeMismatch => "type_mismatch",
            Self::Malformed => "malformed",
            Self::LoadFailure => "load_failure",
        };
        write!(f, "{s}")
    }
}

/// Diagnostic describing why a record was rejected by validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractViolation {
    /// Dedup key of the offending record, or its ordinal when the key
    /// itself is missing.
    pub record_ref: String,
    pub missing_fields: Vec<String>,
    pub cause: RejectionCause,
}

/// A rejected record persisted for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub dedup_key: String,
    pub reason: String,
    pub cause: RejectionCause,
    /// Original payload, serialized. Kept verbatim so rejected data can
    /// be replayed after a contract fix.
    pub record_json: String,
    pub rejected_at: Timestamp,
}
