//! Core orchestration crate for tidemark ingestion runs.

pub mod config;
pub mod errors;
pub mod extract;
pub mod lineage;
pub mod load;
pub mod orchestrator;
pub mod result;
pub mod scheduler;
pub mod stages;

// Re-export public API for convenience
pub use config::{parse_config, validate_config, IngestConfig};
pub use errors::PipelineError;
pub use extract::{ExtractOutcome, ExtractRequest, Extractor};
pub use lineage::{JsonlLineageSink, LineageEmitter, LineageSink, MemoryLineageSink, NullLineageSink};
pub use load::{LoadReport, Loader, RowFailure};
pub use orchestrator::{run_partition, RunContext};
pub use result::{PartitionFailure, PartitionSummary, RunReport};
pub use scheduler::run_source;
