use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tidemark_dest_sqlite::SqliteLoader;
use tidemark_engine::config::types::IngestConfig;
use tidemark_engine::extract::Extractor;
use tidemark_engine::load::Loader;
use tidemark_engine::{
    parse_config, run_source, validate_config, LineageEmitter, RunContext, RunReport,
};
use tidemark_source_jsonl::JsonlSource;
use tidemark_state::SqliteStateBackend;
use tidemark_types::ids::Partition;
use tidemark_types::run::RunStatus;

/// Execute the `run` command: parse, validate, and run every partition.
pub async fn execute(config_path: &Path, partitions: &[String], json: bool) -> Result<()> {
    // 1. Parse and validate the config
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validate_config(&config)?;

    info!(
        source = config.source.name,
        target = config.source.target,
        partitions = config.source.partition_list().len(),
        "Config validated"
    );

    // 2. Wire connectors, state, and lineage
    let ctx = build_context(config)?;

    // 3. Cancel the run on Ctrl-C
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    // 4. Run and report
    let only: Option<Vec<Partition>> = if partitions.is_empty() {
        None
    } else {
        Some(partitions.iter().map(Partition::new).collect())
    };
    let report = run_source(&ctx, only.as_deref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let failed = report
        .partitions
        .iter()
        .filter(|p| p.status == RunStatus::Failed)
        .count()
        + report.failures.len();
    if failed > 0 {
        anyhow::bail!("{failed} partition(s) failed");
    }
    Ok(())
}

/// Resolve connectors by name and open the state backend.
fn build_context(config: IngestConfig) -> Result<RunContext> {
    let extractor: Arc<dyn Extractor> = match config.extract.connector.as_str() {
        "jsonl" => Arc::new(JsonlSource::from_config(&config.extract)),
        other => anyhow::bail!("Unknown extract connector '{other}', expected 'jsonl'"),
    };
    let loader: Arc<dyn Loader> = match config.load.connector.as_str() {
        "sqlite" => Arc::new(SqliteLoader::from_config(&config.load)),
        other => anyhow::bail!("Unknown load connector '{other}', expected 'sqlite'"),
    };
    let state = SqliteStateBackend::open(&config.state.path).with_context(|| {
        format!(
            "Failed to open state database: {}",
            config.state.path.display()
        )
    })?;
    let lineage = LineageEmitter::from_config(&config.lineage);

    Ok(RunContext {
        config: Arc::new(config),
        state: Arc::new(state),
        extractor,
        loader,
        lineage,
        cancel: CancellationToken::new(),
    })
}

fn print_report(report: &RunReport) {
    println!(
        "{:<16} {:<8} {:>9} {:>9} {:>8} {:>7} {:>6}  {:<20} {:>8}",
        "PARTITION",
        "STATUS",
        "PROCESSED",
        "INSERTED",
        "UPDATED",
        "FAILED",
        "DUPES",
        "WATERMARK",
        "TIME"
    );
    for s in &report.partitions {
        println!(
            "{:<16} {:<8} {:>9} {:>9} {:>8} {:>7} {:>6}  {:<20} {:>7.2}s",
            s.partition.as_str(),
            s.status.as_str(),
            s.counters.records_processed,
            s.counters.records_inserted,
            s.counters.records_updated,
            s.counters.records_failed,
            s.counters.duplicates_found,
            s.watermark_after.as_deref().unwrap_or("-"),
            s.duration_secs,
        );
    }

    let totals = report.totals();
    println!();
    println!("  Processed:   {}", totals.records_processed);
    println!("  Inserted:    {}", totals.records_inserted);
    println!("  Updated:     {}", totals.records_updated);
    println!("  Failed:      {}", totals.records_failed);
    println!("  Malformed:   {}", totals.records_malformed);
    println!("  Duplicates:  {}", totals.duplicates_found);
    println!("  Written:     {}", format_bytes(totals.bytes_written));

    let errored: Vec<_> = report
        .partitions
        .iter()
        .filter_map(|s| s.error_message.as_deref().map(|e| (s.partition.as_str(), e)))
        .collect();
    if !errored.is_empty() || !report.failures.is_empty() {
        println!();
        println!("Errors:");
        for (partition, error) in errored {
            println!("  [{partition}] {error}");
        }
        for f in &report.failures {
            println!("  [{}] {}", f.partition.as_str(), f.error);
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
