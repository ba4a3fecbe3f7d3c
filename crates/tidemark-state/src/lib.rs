//! Ingestion state persistence: watermarks, run history, quality
//! metrics, and rejected records.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::StateBackend;
pub use error::{Result, StateError};
pub use sqlite::SqliteStateBackend;
