//! Partition run orchestration.
//!
//! Drives one partition through the full ingestion lifecycle: watermark
//! read, run registration, extract, validate, mask, dedup, load, watermark
//! advance, finalization. Only the extract and load edges are retried;
//! the in-engine transform stages are deterministic, so a failure there
//! would just repeat.
//!
//! Orchestrated failures (contract gates, load row failures, watermark
//! conflicts) finalize the run through the normal lifecycle and come back
//! as `Ok` with a terminal [`PartitionSummary`]. `Err` is reserved for
//! infrastructure faults where the lifecycle itself could not be driven.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tidemark_state::StateBackend;
use tidemark_types::error::StageError;
use tidemark_types::ids::{Partition, SourceName};
use tidemark_types::lineage::{DatasetRef, LineageEvent, OutputStats};
use tidemark_types::quality::{QualityCheck, QualityReport};
use tidemark_types::record::{RejectedRecord, RejectionCause, Timestamp};
use tidemark_types::run::{RunCounters, RunStatus};

use crate::config::types::IngestConfig;
use crate::errors::{compute_backoff, PipelineError};
use crate::extract::{ExtractOutcome, ExtractRequest, Extractor};
use crate::lineage::LineageEmitter;
use crate::load::{LoadReport, Loader};
use crate::result::PartitionSummary;
use crate::stages::dedup::dedup_batch;
use crate::stages::mask::{mask_batch, MaskOutcome};
use crate::stages::validate::{validate_batch, ValidationVerdict};

/// Shared dependencies for running the partitions of one source.
#[derive(Clone)]
pub struct RunContext {
    pub config: Arc<IngestConfig>,
    pub state: Arc<dyn StateBackend>,
    pub extractor: Arc<dyn Extractor>,
    pub loader: Arc<dyn Loader>,
    pub lineage: LineageEmitter,
    pub cancel: CancellationToken,
}

/// Current UTC time as a normalized ISO-8601 string.
pub(crate) fn now_iso() -> Timestamp {
    Timestamp::new(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

// ---------------------------------------------------------------------------
// Stage drivers
// ---------------------------------------------------------------------------

/// Run a state backend call on the blocking pool.
async fn state_blocking<T, F>(
    op_name: &'static str,
    state: &Arc<dyn StateBackend>,
    op: F,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce(&dyn StateBackend) -> Result<T, tidemark_state::StateError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || op(state.as_ref()))
        .await
        .map_err(|e| {
            PipelineError::Infrastructure(anyhow::anyhow!("{op_name} task panicked: {e}"))
        })?
        .map_err(|e| PipelineError::Infrastructure(e.into()))
}

/// Run a CPU-bound transform stage on the blocking pool under the transform
/// deadline. Transform timeouts are terminal: the stages are deterministic,
/// so re-running the same batch would time out again.
async fn cpu_stage<T, F>(
    stage: &'static str,
    timeout_secs: u64,
    op: F,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task = tokio::task::spawn_blocking(op);
    match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PipelineError::Infrastructure(anyhow::anyhow!(
            "{stage} task panicked: {e}"
        ))),
        Err(_) => Err(PipelineError::Stage(StageError::system(
            stage,
            format!("stage timed out after {timeout_secs}s"),
        ))),
    }
}

/// Drive a retryable edge stage (extract or load) under its deadline.
/// Returns the final result plus the number of attempts consumed.
async fn retry_stage<T, F, Fut>(
    cancel: &CancellationToken,
    stage: &'static str,
    max_attempts: u32,
    timeout_secs: u64,
    mut op: F,
) -> (Result<T, StageError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let deadline = Duration::from_secs(timeout_secs);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return (Err(StageError::system(stage, "run cancelled")), attempt);
        }

        let result = match tokio::time::timeout(deadline, op()).await {
            Ok(result) => result,
            Err(_) => Err(StageError::timeout(stage, timeout_secs)),
        };

        match result {
            Ok(value) => return (Ok(value), attempt),
            Err(err) if err.retryable && attempt < max_attempts => {
                let delay = compute_backoff(&err, attempt);
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                warn!(
                    stage,
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "Retryable stage error, will retry"
                );
                tokio::select! {
                    () = cancel.cancelled() => {
                        return (
                            Err(StageError::system(stage, "run cancelled during backoff")),
                            attempt,
                        );
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

/// Identity and bookkeeping for a registered run.
struct ActiveRun {
    source: SourceName,
    partition: Partition,
    run_id: i64,
    input: DatasetRef,
    output: DatasetRef,
    watermark_before: Option<String>,
    started: Instant,
    lines_skipped: u64,
    extract_attempts: u32,
    load_attempts: u32,
}

/// Quality snapshot recorded once per run, regardless of outcome.
fn build_quality(
    dataset: &str,
    layer: &str,
    counters: &RunCounters,
    validation_rejected: u64,
    load_failed: u64,
    threshold_pct: f64,
) -> QualityReport {
    let total = counters.records_processed;
    let mut report = QualityReport::new(dataset, layer, total);

    #[allow(clippy::cast_precision_loss)]
    let rejection_rate_pct = if total == 0 {
        0.0
    } else {
        validation_rejected as f64 / total as f64 * 100.0
    };
    if rejection_rate_pct > threshold_pct {
        report.push(QualityCheck::fail(
            "rejection_rate_pct",
            rejection_rate_pct,
            format!("{validation_rejected} of {total} records rejected"),
        ));
    } else {
        report.push(QualityCheck::pass("rejection_rate_pct", rejection_rate_pct));
    }

    #[allow(clippy::cast_precision_loss)]
    let malformed = counters.records_malformed as f64;
    if counters.records_malformed == 0 {
        report.push(QualityCheck::pass("malformed_count", malformed));
    } else {
        report.push(QualityCheck::fail(
            "malformed_count",
            malformed,
            format!("{} records dropped during masking", counters.records_malformed),
        ));
    }

    #[allow(clippy::cast_precision_loss)]
    report.push(QualityCheck::pass(
        "duplicate_count",
        counters.duplicates_found as f64,
    ));

    #[allow(clippy::cast_precision_loss)]
    let load_failed_value = load_failed as f64;
    if load_failed == 0 {
        report.push(QualityCheck::pass("load_failure_count", load_failed_value));
    } else {
        report.push(QualityCheck::fail(
            "load_failure_count",
            load_failed_value,
            format!("{load_failed} rows failed to load"),
        ));
    }

    report
}

async fn persist_rejected(
    ctx: &RunContext,
    source: &SourceName,
    run_id: i64,
    records: Vec<RejectedRecord>,
) -> Result<u64, PipelineError> {
    if records.is_empty() {
        return Ok(0);
    }
    let source = source.clone();
    state_blocking("insert_rejected", &ctx.state, move |s| {
        s.insert_rejected(&source, run_id, &records)
    })
    .await
}

/// Finalize a run: terminal status, quality snapshot, lineage marker.
///
/// Exactly one terminal lineage event is emitted here, no matter how many
/// retry attempts the run burned on the way.
async fn finalize_run(
    ctx: &RunContext,
    run: ActiveRun,
    status: RunStatus,
    counters: RunCounters,
    watermark_after: Option<String>,
    error: Option<StageError>,
    mut quality: QualityReport,
) -> Result<PartitionSummary, PipelineError> {
    let ActiveRun {
        source,
        partition,
        run_id,
        input,
        output,
        watermark_before,
        started,
        lines_skipped,
        extract_attempts,
        load_attempts,
    } = run;

    let error_message = error.map(|e| e.to_string());

    // sla_minutes is advisory: a breach shows up in the quality report but
    // never changes the run status.
    if let Some(sla) = ctx.config.source.sla_minutes {
        #[allow(clippy::cast_precision_loss)]
        let sla_minutes = sla as f64;
        let minutes = started.elapsed().as_secs_f64() / 60.0;
        if minutes > sla_minutes {
            quality.push(QualityCheck::fail(
                "run_duration_minutes",
                minutes,
                format!("run exceeded the {sla} minute SLA"),
            ));
        } else {
            quality.push(QualityCheck::pass("run_duration_minutes", minutes));
        }
    }

    {
        let message = error_message.clone();
        state_blocking("complete_run", &ctx.state, move |s| {
            s.complete_run(run_id, status, &counters, message.as_deref())
        })
        .await?;
    }

    state_blocking("record_quality", &ctx.state, move |s| {
        s.record_quality(run_id, &quality)
    })
    .await?;

    let event = if status == RunStatus::Failed {
        LineageEvent::fail(
            run_id,
            source.clone(),
            partition.clone(),
            input,
            output,
            error_message
                .clone()
                .unwrap_or_else(|| "run failed".to_string()),
            now_iso(),
        )
    } else {
        LineageEvent::complete(
            run_id,
            source.clone(),
            partition.clone(),
            input,
            output,
            OutputStats {
                row_count: counters.records_inserted + counters.records_updated,
                bytes: counters.bytes_written,
            },
            now_iso(),
        )
    };
    ctx.lineage.emit(event).await;

    info!(
        source = %source,
        partition = %partition,
        run_id,
        status = %status,
        processed = counters.records_processed,
        inserted = counters.records_inserted,
        updated = counters.records_updated,
        failed = counters.records_failed,
        "Partition run finished"
    );

    Ok(PartitionSummary {
        source,
        partition,
        run_id,
        status,
        counters,
        watermark_before,
        watermark_after,
        lines_skipped,
        extract_attempts,
        load_attempts,
        duration_secs: started.elapsed().as_secs_f64(),
        error_message,
    })
}

// ---------------------------------------------------------------------------
// run_partition
// ---------------------------------------------------------------------------

/// Execute one partition run end to end.
///
/// # Errors
///
/// Returns [`PipelineError`] only for infrastructure faults (state backend
/// unavailable, task panics). Data-level failures finalize the run and are
/// reported in the returned summary instead.
#[allow(clippy::too_many_lines)]
pub async fn run_partition(
    ctx: &RunContext,
    partition: Partition,
) -> Result<PartitionSummary, PipelineError> {
    let started = Instant::now();
    let cfg = &ctx.config.source;
    let source = SourceName::new(cfg.name.clone());

    info!(source = %source, partition = %partition, "Starting partition run");

    // Last committed watermark. Absent means this partition has never
    // completed a run: full initial load.
    let watermark_before = {
        let source = source.clone();
        let partition = partition.clone();
        state_blocking("get_watermark", &ctx.state, move |s| {
            s.get_watermark(&source, &partition)
        })
        .await?
    }
    .map(|w| w.value);

    let run_id = {
        let source = source.clone();
        let partition = partition.clone();
        state_blocking("start_run", &ctx.state, move |s| {
            s.start_run(&source, &partition)
        })
        .await?
    };
    state_blocking("mark_running", &ctx.state, move |s| s.mark_running(run_id)).await?;

    let input = DatasetRef::new(ctx.config.extract.connector.clone(), cfg.name.clone());
    let output = DatasetRef::new(ctx.config.load.connector.clone(), cfg.target.clone());
    ctx.lineage
        .emit(LineageEvent::start(
            run_id,
            source.clone(),
            partition.clone(),
            input.clone(),
            output.clone(),
            now_iso(),
        ))
        .await;

    let mut run = ActiveRun {
        source: source.clone(),
        partition: partition.clone(),
        run_id,
        input,
        output,
        watermark_before: watermark_before.clone(),
        started,
        lines_skipped: 0,
        extract_attempts: 0,
        load_attempts: 0,
    };
    let mut counters = RunCounters::default();

    // Extract, bounded and strictly newer than the watermark.
    let request = ExtractRequest {
        source: source.clone(),
        partition: partition.clone(),
        watermark: watermark_before.clone(),
        batch_size: cfg.batch_size,
        watermark_column: cfg.watermark_column.clone(),
        dedup_key_field: cfg.dedup.key_field.clone(),
    };
    let extractor = Arc::clone(&ctx.extractor);
    let (extracted, extract_attempts) = retry_stage(
        &ctx.cancel,
        "extract",
        ctx.config.retry.extract_max_attempts,
        ctx.config.timeouts.extract_secs,
        || {
            let extractor = Arc::clone(&extractor);
            let request = request.clone();
            async move { extractor.extract(&request).await }
        },
    )
    .await;
    run.extract_attempts = extract_attempts;

    let outcome = match extracted {
        Ok(outcome) => outcome,
        Err(err) => {
            let quality =
                build_quality(cfg.name.as_str(), &cfg.target, &counters, 0, 0, cfg.rejection_threshold_pct);
            return finalize_run(
                ctx,
                run,
                RunStatus::Failed,
                counters,
                watermark_before,
                Some(err),
                quality,
            )
            .await;
        }
    };

    let batch = match outcome {
        ExtractOutcome::Empty => {
            info!(source = %source, partition = %partition, "Source has nothing newer than the watermark");
            let quality =
                build_quality(cfg.name.as_str(), &cfg.target, &counters, 0, 0, cfg.rejection_threshold_pct);
            return finalize_run(
                ctx,
                run,
                RunStatus::Success,
                counters,
                watermark_before,
                None,
                quality,
            )
            .await;
        }
        ExtractOutcome::Batch(batch) => batch,
    };

    counters.records_processed = batch.len() as u64;
    run.lines_skipped = batch.lines_skipped;
    let max_watermark = batch.max_watermark.clone();

    // A cancelled run is finalized as failed rather than abandoned, so its
    // run record and FAIL event still land and the watermark stays put.
    if ctx.cancel.is_cancelled() {
        let quality = build_quality(
            cfg.name.as_str(),
            &cfg.target,
            &counters,
            0,
            0,
            cfg.rejection_threshold_pct,
        );
        return finalize_run(
            ctx,
            run,
            RunStatus::Failed,
            counters,
            watermark_before,
            Some(StageError::system("validate", "run cancelled")),
            quality,
        )
        .await;
    }

    // Contract validation with the hard rejection gate.
    let verdict = if cfg.contract_validation_enabled {
        let records = batch.records;
        let required = cfg.contract.required.clone();
        let watermark_column = cfg.watermark_column.clone();
        let threshold_pct = cfg.rejection_threshold_pct;
        let stamp = now_iso();
        cpu_stage("validate", ctx.config.timeouts.transform_secs, move || {
            validate_batch(records, &required, &watermark_column, threshold_pct, &stamp)
        })
        .await?
    } else {
        ValidationVerdict::Passed {
            records: batch.records,
            rejected: Vec::new(),
        }
    };

    let (passing, mut rejected) = match verdict {
        ValidationVerdict::Gated {
            rejected,
            rejected_count,
            total,
            threshold_pct,
        } => {
            // The whole batch is refused; nothing reaches the target and
            // the watermark stays where it was.
            persist_rejected(ctx, &source, run_id, rejected).await?;
            counters.records_failed = counters.records_processed;
            let quality = build_quality(
                cfg.name.as_str(),
                &cfg.target,
                &counters,
                rejected_count,
                0,
                threshold_pct,
            );
            let err = StageError::hard_gate(rejected_count, total, threshold_pct);
            return finalize_run(
                ctx,
                run,
                RunStatus::Failed,
                counters,
                watermark_before,
                Some(err),
                quality,
            )
            .await;
        }
        ValidationVerdict::Passed { records, rejected } => (records, rejected),
    };
    let validation_rejected = rejected.len() as u64;
    counters.records_failed += validation_rejected;

    // PII masking. Malformed values surface here, after validation passed.
    let masked = if cfg.pii_masking_enabled && !cfg.masking.rules.is_empty() {
        let masking = cfg.masking.clone();
        let stamp = now_iso();
        cpu_stage("mask", ctx.config.timeouts.transform_secs, move || {
            mask_batch(passing, &masking, &stamp)
        })
        .await?
    } else {
        MaskOutcome {
            records: passing,
            malformed: Vec::new(),
        }
    };
    counters.records_malformed = masked.malformed.len() as u64;
    rejected.extend(masked.malformed);

    // Deduplicate by business key.
    let deduped = {
        let records = masked.records;
        let dedup_cfg = cfg.dedup.clone();
        cpu_stage("dedup", ctx.config.timeouts.transform_secs, move || {
            dedup_batch(records, &dedup_cfg)
        })
        .await?
    };
    counters.duplicates_found = deduped.duplicates_found;

    persist_rejected(ctx, &source, run_id, rejected).await?;

    // Load survivors into the target.
    let to_load = Arc::new(deduped.records);
    let (load_result, load_attempts) = if to_load.is_empty() {
        (Ok(LoadReport::default()), 0)
    } else {
        let loader = Arc::clone(&ctx.loader);
        let target = cfg.target.clone();
        let records = Arc::clone(&to_load);
        retry_stage(
            &ctx.cancel,
            "load",
            ctx.config.retry.load_max_attempts,
            ctx.config.timeouts.load_secs,
            || {
                let loader = Arc::clone(&loader);
                let target = target.clone();
                let records = Arc::clone(&records);
                async move { loader.load(&target, records.as_slice()).await }
            },
        )
        .await
    };
    run.load_attempts = load_attempts;

    let report = match load_result {
        Ok(report) => report,
        Err(err) => {
            // Batch-level load fault after retries: no rows landed.
            counters.records_failed += to_load.len() as u64;
            let quality = build_quality(
                cfg.name.as_str(),
                &cfg.target,
                &counters,
                validation_rejected,
                to_load.len() as u64,
                cfg.rejection_threshold_pct,
            );
            return finalize_run(
                ctx,
                run,
                RunStatus::Failed,
                counters,
                watermark_before,
                Some(err),
                quality,
            )
            .await;
        }
    };

    counters.records_inserted = report.inserted;
    counters.records_updated = report.updated;
    counters.bytes_written = report.bytes_written;
    let load_failed = report.failures.len() as u64;
    counters.records_failed += load_failed;

    if !report.failures.is_empty() {
        let stamp = now_iso();
        let row_rejects: Vec<RejectedRecord> = report
            .failures
            .iter()
            .map(|failure| {
                let record_json = to_load
                    .iter()
                    .find(|r| r.dedup_key == failure.dedup_key)
                    .map(|r| serde_json::Value::Object(r.payload.clone()).to_string())
                    .unwrap_or_default();
                RejectedRecord {
                    dedup_key: failure.dedup_key.clone(),
                    reason: failure.message.clone(),
                    cause: RejectionCause::LoadFailure,
                    record_json,
                    rejected_at: stamp.clone(),
                }
            })
            .collect();
        persist_rejected(ctx, &source, run_id, row_rejects).await?;
    }

    let mut status = if report.failures.is_empty() {
        RunStatus::Success
    } else if report.all_rows_failed() {
        RunStatus::Failed
    } else {
        RunStatus::Partial
    };
    let mut error = (!report.failures.is_empty())
        .then(|| StageError::partial_load(load_failed, report.rows_attempted()));

    // Advance the watermark only when the batch produced durable progress.
    // The compare-and-set guards against a concurrent run of the same
    // partition: losing the race means our read was stale, and the run is
    // failed rather than silently double-committed.
    let mut watermark_after = watermark_before.clone();
    if status != RunStatus::Failed {
        let advanced = {
            let source = source.clone();
            let partition = partition.clone();
            let expected = watermark_before.clone();
            let new_value = max_watermark.0.clone();
            state_blocking("advance_watermark", &ctx.state, move |s| {
                s.advance_watermark(&source, &partition, expected.as_deref(), &new_value)
            })
            .await?
        };
        if advanced {
            watermark_after = Some(max_watermark.0.clone());
        } else {
            warn!(
                source = %source,
                partition = %partition,
                run_id,
                "Watermark advance lost to a concurrent run"
            );
            status = RunStatus::Failed;
            error = Some(StageError::conflict(format!(
                "watermark for {source}/{partition} was advanced by a concurrent run"
            )));
        }
    }

    let quality = build_quality(
        cfg.name.as_str(),
        &cfg.target,
        &counters,
        validation_rejected,
        load_failed,
        cfg.rejection_threshold_pct,
    );
    finalize_run(ctx, run, status, counters, watermark_after, error, quality).await
}
