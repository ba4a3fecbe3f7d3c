use std::path::Path;

use anyhow::{Context, Result};

use tidemark_engine::{parse_config, validate_config};
use tidemark_state::SqliteStateBackend;

/// Execute the `check` command: validate the config and probe the
/// pieces a run would touch, without moving any data.
pub fn execute(config_path: &Path) -> Result<()> {
    // 1. Parse config YAML
    let config = parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    println!("{:18} OK", "Config parse:");

    // 2. Validate structure and policies
    validate_config(&config)?;
    println!("{:18} OK", "Config structure:");

    // 3. Connector names must resolve
    match config.extract.connector.as_str() {
        "jsonl" => println!("{:18} OK ({})", "Source connector:", config.extract.connector),
        other => anyhow::bail!("Unknown extract connector '{other}', expected 'jsonl'"),
    }
    match config.load.connector.as_str() {
        "sqlite" => println!("{:18} OK ({})", "Dest connector:", config.load.connector),
        other => anyhow::bail!("Unknown load connector '{other}', expected 'sqlite'"),
    }

    // 4. State database must open
    SqliteStateBackend::open(&config.state.path).with_context(|| {
        format!(
            "Failed to open state database: {}",
            config.state.path.display()
        )
    })?;
    println!("{:18} OK", "State backend:");

    // 5. Landing directory. Missing is a warning, not an error: the
    // directory may only exist once upstream delivery starts.
    if config.extract.path.is_dir() {
        println!("{:18} OK", "Landing dir:");
    } else {
        println!(
            "{:18} WARNING (not found: {})",
            "Landing dir:",
            config.extract.path.display()
        );
    }

    println!("\nAll checks passed.");
    Ok(())
}
