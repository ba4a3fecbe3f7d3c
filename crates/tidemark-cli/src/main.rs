mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tidemark",
    version,
    about = "Watermark-driven incremental ingestion engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every partition of the configured source
    Run {
        /// Path to ingestion config YAML
        #[arg(long)]
        config: PathBuf,
        /// Run only the named partition (repeatable)
        #[arg(long = "partition")]
        partitions: Vec<String>,
        /// Print the run report as one JSON document
        #[arg(long)]
        json: bool,
    },
    /// Validate an ingestion config without running it
    Check {
        /// Path to ingestion config YAML
        #[arg(long)]
        config: PathBuf,
    },
    /// Show recent runs from the state store
    History {
        /// Path to ingestion config YAML
        #[arg(long)]
        config: PathBuf,
        /// Only show runs of this source
        #[arg(long)]
        source: Option<String>,
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show stored watermarks for the configured source
    Watermark {
        /// Path to ingestion config YAML
        #[arg(long)]
        config: PathBuf,
        /// Only show the named partition
        #[arg(long)]
        partition: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            partitions,
            json,
        } => commands::run::execute(&config, &partitions, json).await,
        Commands::Check { config } => commands::check::execute(&config),
        Commands::History {
            config,
            source,
            limit,
        } => commands::history::execute(&config, source.as_deref(), limit),
        Commands::Watermark { config, partition } => {
            commands::watermark::execute(&config, partition.as_deref())
        }
    }
}
