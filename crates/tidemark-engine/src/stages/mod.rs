//! In-engine transform stages: contract validation, PII masking, dedup.
//!
//! Each stage is a pure function over owned record batches. The orchestrator
//! runs them on blocking threads so transform cost never stalls the runtime.

pub mod dedup;
pub mod mask;
pub mod validate;
