use std::path::Path;

use anyhow::{Context, Result};

use tidemark_engine::parse_config;
use tidemark_state::{SqliteStateBackend, StateBackend};
use tidemark_types::ids::{Partition, SourceName};

/// Execute the `watermark` command: show stored watermarks for the
/// configured source, one line per partition.
pub fn execute(config_path: &Path, partition: Option<&str>) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    let state = SqliteStateBackend::open(&config.state.path).with_context(|| {
        format!(
            "Failed to open state database: {}",
            config.state.path.display()
        )
    })?;

    let source = SourceName::new(&config.source.name);
    let partitions: Vec<Partition> = match partition {
        Some(name) => vec![Partition::new(name)],
        None => config.source.partition_list(),
    };

    println!("Source '{}':", source.as_str());
    for partition in &partitions {
        match state.get_watermark(&source, partition)? {
            Some(wm) => println!(
                "  {:<16} {}  (advanced {})",
                partition.as_str(),
                wm.value,
                wm.updated_at
            ),
            None => println!("  {:<16} (none; next run is a full load)", partition.as_str()),
        }
    }
    Ok(())
}
