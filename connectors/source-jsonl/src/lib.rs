//! JSONL landing-directory source connector.
//!
//! Reads `<root>/<partition>/*.jsonl` (the reserved `default` partition
//! reads `<root>/*.jsonl` directly), keeps records strictly newer than the
//! run's watermark, and returns them ordered by (watermark value, file,
//! line), capped at the requested batch size.

mod scan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use tidemark_engine::config::types::ExtractConfig;
use tidemark_engine::extract::{ExtractOutcome, ExtractRequest, Extractor};
use tidemark_types::error::StageError;
use tidemark_types::record::{Batch, Record};

use crate::scan::{scan_file, FileScan, ScannedRow};

/// Source connector reading JSON-lines files from a landing directory.
pub struct JsonlSource {
    root: PathBuf,
    max_parallel_reads: usize,
}

impl JsonlSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, max_parallel_reads: usize) -> Self {
        Self {
            root: root.into(),
            max_parallel_reads: max_parallel_reads.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(config.path.clone(), config.max_parallel_reads)
    }

    /// Directory holding this partition's files. The reserved `default`
    /// partition reads the landing root itself.
    fn partition_dir(&self, partition: &str) -> PathBuf {
        if partition == "default" {
            self.root.clone()
        } else {
            self.root.join(partition)
        }
    }
}

async fn list_jsonl_files(dir: &Path) -> Result<Vec<PathBuf>, StageError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StageError::transient_io("extract", &e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StageError::transient_io("extract", &e))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("jsonl") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Extractor for JsonlSource {
    async fn extract(&self, req: &ExtractRequest) -> Result<ExtractOutcome, StageError> {
        let dir = self.partition_dir(req.partition.as_str());
        let files = list_jsonl_files(&dir).await?;
        if files.is_empty() {
            debug!(dir = %dir.display(), "No landing files for partition");
            return Ok(ExtractOutcome::Empty);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_reads));
        let mut tasks: JoinSet<Result<FileScan, StageError>> = JoinSet::new();
        for path in files {
            let permit = Arc::clone(&semaphore).acquire_owned().await.map_err(|e| {
                StageError::system("extract", format!("file read semaphore closed: {e}"))
            })?;
            let watermark = req.watermark.clone();
            let watermark_column = req.watermark_column.clone();
            tasks.spawn(async move {
                let _permit = permit;
                scan_file(&path, watermark.as_deref(), &watermark_column).await
            });
        }

        let mut rows: Vec<ScannedRow> = Vec::new();
        let mut lines_skipped = 0u64;
        while let Some(joined) = tasks.join_next().await {
            let scan = joined.map_err(|e| {
                StageError::system("extract", format!("file read task panicked: {e}"))
            })??;
            lines_skipped += scan.lines_skipped;
            rows.extend(scan.rows);
        }

        // Global extraction order. Ties between files resolve by name and
        // line position, so a re-read of the same landing state yields the
        // same batch.
        rows.sort_by(|a, b| {
            a.watermark_value
                .cmp(&b.watermark_value)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line.cmp(&b.line))
        });
        if rows.len() > req.batch_size {
            debug!(
                scanned = rows.len(),
                batch_size = req.batch_size,
                "Capping batch; remaining rows wait for the next run"
            );
            rows.truncate(req.batch_size);
        }

        if rows.is_empty() {
            return Ok(ExtractOutcome::Empty);
        }

        let records: Vec<Record> = rows
            .into_iter()
            .enumerate()
            .map(|(ordinal, row)| {
                Record::from_payload(
                    row.payload,
                    &req.dedup_key_field,
                    &req.watermark_column,
                    ordinal as u64,
                )
            })
            .collect();

        Ok(ExtractOutcome::Batch(Batch::new(
            req.source.clone(),
            req.partition.clone(),
            records,
            lines_skipped,
        )))
    }
}
