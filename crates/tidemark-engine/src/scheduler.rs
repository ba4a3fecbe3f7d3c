//! Multi-partition scheduling.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

use tidemark_types::ids::{Partition, SourceName};

use crate::errors::PipelineError;
use crate::orchestrator::{run_partition, RunContext};
use crate::result::{PartitionFailure, PartitionSummary, RunReport};

/// Run the configured partitions of one source, at most
/// `runtime.max_concurrent_partitions` at a time.
///
/// Partitions are isolated: a failing partition finalizes its own run and
/// never interrupts its siblings. The report carries every outcome, both
/// the finalized summaries and the partitions whose lifecycle could not be
/// driven at all.
///
/// # Errors
///
/// Returns [`PipelineError`] only when a partition task panics outright.
pub async fn run_source(
    ctx: &RunContext,
    only: Option<&[Partition]>,
) -> Result<RunReport, PipelineError> {
    let mut partitions = ctx.config.source.partition_list();
    if let Some(only) = only {
        partitions.retain(|p| only.contains(p));
    }

    let limit = ctx.config.runtime.max_concurrent_partitions.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks: JoinSet<(Partition, Result<PartitionSummary, PipelineError>)> = JoinSet::new();

    for partition in partitions {
        let permit = Arc::clone(&semaphore).acquire_owned().await.map_err(|e| {
            PipelineError::Infrastructure(anyhow::anyhow!("partition semaphore closed: {e}"))
        })?;
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = run_partition(&ctx, partition.clone()).await;
            (partition, outcome)
        });
    }

    let mut summaries = Vec::new();
    let mut failures = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => summaries.push(summary),
            Ok((partition, Err(err))) => {
                error!(
                    partition = %partition,
                    error = %err,
                    "Partition run hit an infrastructure fault"
                );
                failures.push(PartitionFailure {
                    partition,
                    error: err.to_string(),
                });
            }
            Err(join_err) => {
                return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                    "partition task panicked: {join_err}"
                )));
            }
        }
    }

    // Completion order depends on scheduling; report in a stable order.
    summaries.sort_by(|a, b| a.partition.as_str().cmp(b.partition.as_str()));
    failures.sort_by(|a, b| a.partition.as_str().cmp(b.partition.as_str()));

    Ok(RunReport {
        source: SourceName::new(ctx.config.source.name.clone()),
        partitions: summaries,
        failures,
    })
}
