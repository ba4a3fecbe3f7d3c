use std::path::Path;

use anyhow::{Context, Result};

use tidemark_engine::parse_config;
use tidemark_state::{SqliteStateBackend, StateBackend};
use tidemark_types::ids::SourceName;

/// Execute the `history` command: list recent runs, newest first.
pub fn execute(config_path: &Path, source: Option<&str>, limit: u32) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    let state = SqliteStateBackend::open(&config.state.path).with_context(|| {
        format!(
            "Failed to open state database: {}",
            config.state.path.display()
        )
    })?;

    let source_name = source.map(SourceName::new);
    let runs = state.list_runs(source_name.as_ref(), limit)?;

    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    println!(
        "{:>6} {:<14} {:<14} {:<8} {:<20} {:>9} {:>8} {:>7}",
        "RUN", "SOURCE", "PARTITION", "STATUS", "STARTED", "PROCESSED", "FAILED", "DUPES"
    );
    for run in &runs {
        println!(
            "{:>6} {:<14} {:<14} {:<8} {:<20} {:>9} {:>8} {:>7}",
            run.run_id,
            run.source,
            run.partition,
            run.status,
            run.started_at,
            run.counters.records_processed,
            run.counters.records_failed,
            run.counters.duplicates_found,
        );
        if let Some(error) = &run.error_message {
            println!("       {error}");
        }
    }
    Ok(())
}
