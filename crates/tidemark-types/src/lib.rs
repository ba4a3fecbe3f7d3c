//! Shared data model and error types for the tidemark ingestion engine.
//!
//! Pure data types used across the engine, state backend, and connector
//! crates. This crate stays dependency-light so every layer can share it
//! without cycles.

#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod lineage;
pub mod quality;
pub mod record;
pub mod run;
pub mod watermark;
