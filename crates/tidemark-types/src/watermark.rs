//! Watermark state as stored per (source, partition).

use serde::{Deserialize, Serialize};

/// The persisted high-water mark for one partition of a source.
///
/// An absent watermark means the partition has never completed a run;
/// the extractor then performs a full initial load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkState {
    /// Highest watermark-column value that has been durably loaded.
    pub value: String,
    /// When the watermark last advanced, ISO-8601.
    pub updated_at: String,
}

impl WatermarkState {
    #[must_use]
    pub fn new(value: impl Into<String>, updated_at: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            updated_at: updated_at.into(),
        }
    }
}
