//! Ingestion config model deserialized from YAML.

use std::path::PathBuf;

use serde::Deserialize;
use tidemark_types::ids::Partition;

fn default_batch_size() -> usize {
    500
}

fn default_rejection_threshold() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_weight_payload() -> f64 {
    4.0
}

fn default_weight_completeness() -> f64 {
    2.0
}

fn default_max_parallel_reads() -> usize {
    4
}

fn default_truncate_len() -> usize {
    4
}

/// Top-level ingestion configuration for one source.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub version: String,
    pub source: SourceConfig,
    pub extract: ExtractConfig,
    pub load: LoadConfig,
    pub state: StateConfig,
    #[serde(default)]
    pub lineage: LineageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Source identity, batching, and per-source policy knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Independent partitions of this source. Empty means the single
    /// `default` partition.
    #[serde(default)]
    pub partitions: Vec<String>,
    /// Destination table or dataset name.
    pub target: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Source column whose values drive incremental extraction.
    pub watermark_column: String,
    /// Soft deadline per partition run, surfaced as a quality check.
    #[serde(default)]
    pub sla_minutes: Option<u64>,
    /// Hard gate: a run fails outright when the validation rejection
    /// rate exceeds this percentage.
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold_pct: f64,
    #[serde(default = "default_true")]
    pub contract_validation_enabled: bool,
    #[serde(default = "default_true")]
    pub pii_masking_enabled: bool,
    #[serde(default)]
    pub contract: ContractConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
    pub dedup: DedupConfig,
}

impl SourceConfig {
    /// Partitions to run, defaulting to the single `default` partition.
    #[must_use]
    pub fn partition_list(&self) -> Vec<Partition> {
        if self.partitions.is_empty() {
            vec![Partition::default()]
        } else {
            self.partitions.iter().map(Partition::new).collect()
        }
    }
}

/// Required-field contract for validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub required: Vec<String>,
}

/// PII masking rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaskingConfig {
    /// Salt mixed into hash masking; fixed per source so masked values
    /// stay stable across runs.
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub rules: Vec<MaskRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskRule {
    pub field: String,
    pub strategy: MaskStrategy,
    /// Characters kept by the `truncate` strategy.
    #[serde(default = "default_truncate_len")]
    pub max_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskStrategy {
    /// Replace with a salted SHA-256 digest.
    Hash,
    /// Replace with a fixed placeholder.
    Redact,
    /// Keep only a leading fragment.
    Truncate,
}

/// Deduplication policy: grouping key and ranking weights.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Payload field holding the business identity.
    pub key_field: String,
    /// Payload field whose presence marks a record as carrying a full
    /// body (e.g. `items`). Optional; without it the payload-presence
    /// term drops out of the ranking.
    #[serde(default)]
    pub body_field: Option<String>,
    #[serde(default = "default_weight_payload")]
    pub weight_payload: f64,
    #[serde(default = "default_weight_completeness")]
    pub weight_completeness: f64,
}

/// Extractor connector selection and its options.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    /// Connector name, e.g. `jsonl`.
    pub connector: String,
    /// Root directory holding one subdirectory per partition.
    pub path: PathBuf,
    #[serde(default = "default_max_parallel_reads")]
    pub max_parallel_reads: usize,
}

/// Loader connector selection and its options.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// Connector name, e.g. `sqlite`.
    pub connector: String,
    pub path: PathBuf,
}

/// State database location.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageSinkKind {
    /// Append events to a JSON-lines file.
    Jsonl,
    /// Discard events.
    #[default]
    Null,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub sink: LineageSinkKind,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub extract_max_attempts: u32,
    pub load_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            extract_max_attempts: 3,
            load_max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub extract_secs: u64,
    pub transform_secs: u64,
    pub load_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extract_secs: 30,
            transform_secs: 30,
            load_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_concurrent_partitions: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_partitions: 4,
        }
    }
}
