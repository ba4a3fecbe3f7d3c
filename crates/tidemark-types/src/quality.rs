//! Data quality report types.

use serde::{Deserialize, Serialize};

/// One named quality check with its observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub name: String,
    pub passed: bool,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl QualityCheck {
    #[must_use]
    pub fn pass(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            passed: true,
            value,
            details: None,
        }
    }

    #[must_use]
    pub fn fail(name: impl Into<String>, value: f64, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            value,
            details: Some(details.into()),
        }
    }
}

/// Quality summary recorded once per run, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Dataset the checks ran against, e.g. `"orders"`.
    pub dataset: String,
    /// Pipeline layer the snapshot was taken at, e.g. `"warehouse"`.
    pub layer: String,
    pub total_records: u64,
    pub checks: Vec<QualityCheck>,
}

impl QualityReport {
    #[must_use]
    pub fn new(dataset: impl Into<String>, layer: impl Into<String>, total_records: u64) -> Self {
        Self {
            dataset: dataset.into(),
            layer: layer.into(),
            total_records,
            checks: Vec::new(),
        }
    }

    pub fn push(&mut self, check: QualityCheck) {
        self.checks.push(check);
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}
