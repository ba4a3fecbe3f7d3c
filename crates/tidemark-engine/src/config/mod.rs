//! Ingestion configuration: YAML parsing, env substitution, validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_config, parse_config_str};
pub use types::IngestConfig;
pub use validator::validate_config;
