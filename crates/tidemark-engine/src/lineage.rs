//! Lineage event emission.
//!
//! Every run emits a START marker before extraction and exactly one terminal
//! COMPLETE or FAIL marker when it finishes, regardless of how many retry
//! attempts happened in between. Emission is best effort: a sink failure is
//! logged and swallowed, it never changes the outcome of a run.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::warn;

use tidemark_types::lineage::LineageEvent;

use crate::config::types::{LineageConfig, LineageSinkKind};

/// Destination for lineage events. Sinks are synchronous; the emitter moves
/// them off the async runtime.
pub trait LineageSink: Send + Sync {
    /// Record one event.
    ///
    /// # Errors
    ///
    /// Returns an error when the sink cannot persist the event.
    fn emit(&self, event: &LineageEvent) -> Result<()>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlLineageSink {
    path: PathBuf,
}

impl JsonlLineageSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LineageSink for JsonlLineageSink {
    fn emit(&self, event: &LineageEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create lineage directory {}", parent.display())
                })?;
            }
        }
        let line = serde_json::to_string(event).context("failed to encode lineage event")?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}").context("failed to append lineage event")?;
        Ok(())
    }
}

/// Discards every event.
pub struct NullLineageSink;

impl LineageSink for NullLineageSink {
    fn emit(&self, _event: &LineageEvent) -> Result<()> {
        Ok(())
    }
}

/// Collects events in memory. Test aid for asserting on emission order.
#[derive(Default)]
pub struct MemoryLineageSink {
    events: Mutex<Vec<LineageEvent>>,
}

impl MemoryLineageSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<LineageEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LineageSink for MemoryLineageSink {
    fn emit(&self, event: &LineageEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Best-effort front end over a [`LineageSink`].
#[derive(Clone)]
pub struct LineageEmitter {
    sink: Arc<dyn LineageSink>,
}

impl LineageEmitter {
    #[must_use]
    pub fn new(sink: Arc<dyn LineageSink>) -> Self {
        Self { sink }
    }

    #[must_use]
    pub fn from_config(config: &LineageConfig) -> Self {
        let sink: Arc<dyn LineageSink> = match (config.sink, config.path.as_ref()) {
            (LineageSinkKind::Jsonl, Some(path)) => Arc::new(JsonlLineageSink::new(path)),
            _ => Arc::new(NullLineageSink),
        };
        Self::new(sink)
    }

    /// Emit one event. Failures are logged at warn level and swallowed.
    pub async fn emit(&self, event: LineageEvent) {
        let sink = Arc::clone(&self.sink);
        let outcome = tokio::task::spawn_blocking(move || sink.emit(&event)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "lineage emission failed"),
            Err(err) => warn!(error = %err, "lineage emission task panicked"),
        }
    }
}
