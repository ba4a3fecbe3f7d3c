//! Identifier newtypes shared across the engine and state backend.

use serde::{Deserialize, Serialize};

/// Logical name of an ingestion source (e.g. `"orders"`).
///
/// Watermarks, runs, and quality reports are all keyed by source name, so
/// two configs that share a name share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for SourceName {
    fn from(s: S) -> Self {
        Self::new(s)
    }
}

/// A partition of a source, processed independently of its siblings.
///
/// Sources that are not partitioned use [`Partition::default`], which maps
/// to the reserved name `"default"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(String);

impl Partition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for Partition {
    fn from(s: S) -> Self {
        Self::new(s)
    }
}
