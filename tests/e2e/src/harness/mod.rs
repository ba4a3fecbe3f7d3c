//! Shared fixtures for end-to-end tests.
//!
//! Each test gets a tempdir holding a JSONL landing zone, a SQLite
//! warehouse, a SQLite state database, and a JSONL lineage log, then
//! runs the real engine with the real connectors against them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tidemark_dest_sqlite::SqliteLoader;
use tidemark_engine::config::parse_config_str;
use tidemark_engine::{
    run_source, validate_config, LineageEmitter, RunContext, RunReport,
};
use tidemark_source_jsonl::JsonlSource;
use tidemark_state::{SqliteStateBackend, StateBackend};
use tidemark_types::ids::{Partition, SourceName};

/// Source name rendered into every e2e config.
pub const SOURCE: &str = "orders";
/// Destination table rendered into every e2e config.
pub const TARGET: &str = "warehouse_orders";

pub struct E2eContext {
    root: TempDir,
}

/// Create a fresh fixture directory with an empty landing zone.
pub fn bootstrap() -> Result<E2eContext> {
    let root = tempfile::tempdir().context("failed to create e2e tempdir")?;
    std::fs::create_dir_all(root.path().join("landing"))
        .context("failed to create landing dir")?;
    Ok(E2eContext { root })
}

/// Knobs rendered into the config YAML. Raw blocks (`masking_block`)
/// are spliced in verbatim and must carry two-space indentation under
/// `source:`.
pub struct ConfigOpts {
    pub partitions: Vec<String>,
    pub batch_size: usize,
    pub rejection_threshold_pct: f64,
    pub contract_validation_enabled: bool,
    pub masking_block: Option<String>,
    pub lineage: bool,
}

impl Default for ConfigOpts {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            batch_size: 500,
            rejection_threshold_pct: 10.0,
            contract_validation_enabled: true,
            masking_block: None,
            lineage: true,
        }
    }
}

/// A well-formed order row for the default contract.
pub fn order_row(id: &str, updated_at: &str, amount: f64) -> serde_json::Value {
    serde_json::json!({
        "order_id": id,
        "updated_at": updated_at,
        "amount": amount,
        "email": format!("{id}@example.com"),
        "items": [{"sku": "widget", "qty": 1}],
    })
}

impl E2eContext {
    pub fn landing_dir(&self) -> PathBuf {
        self.root.path().join("landing")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.path().join("state.db")
    }

    pub fn warehouse_path(&self) -> PathBuf {
        self.root.path().join("warehouse.db")
    }

    pub fn lineage_path(&self) -> PathBuf {
        self.root.path().join("lineage.jsonl")
    }

    /// Write one JSONL file into a partition's landing directory. The
    /// `default` partition lands in the root of the landing zone.
    pub fn write_landing_file(
        &self,
        partition: &str,
        file_name: &str,
        rows: &[serde_json::Value],
    ) -> Result<()> {
        let dir = if partition == "default" {
            self.landing_dir()
        } else {
            self.landing_dir().join(partition)
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create partition dir {}", dir.display()))?;
        let mut body = rows
            .iter()
            .map(serde_json::Value::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        body.push('\n');
        std::fs::write(dir.join(file_name), body)
            .with_context(|| format!("failed to write landing file {file_name}"))?;
        Ok(())
    }

    pub fn config_yaml(&self, opts: &ConfigOpts) -> String {
        let partitions = if opts.partitions.is_empty() {
            String::new()
        } else {
            format!("  partitions: [{}]\n", opts.partitions.join(", "))
        };
        let masking = opts
            .masking_block
            .as_deref()
            .map(|block| format!("  masking:\n{block}\n"))
            .unwrap_or_default();
        let lineage = if opts.lineage {
            format!(
                "lineage:\n  sink: jsonl\n  path: {}\n",
                self.lineage_path().display()
            )
        } else {
            String::new()
        };

        format!(
            r#"version: "1.0"
source:
  name: {SOURCE}
{partitions}  target: {TARGET}
  batch_size: {batch_size}
  watermark_column: updated_at
  rejection_threshold_pct: {threshold}
  contract_validation_enabled: {validation}
  contract:
    required: [order_id, updated_at, amount]
{masking}  dedup:
    key_field: order_id
    body_field: items
extract:
  connector: jsonl
  path: {landing}
load:
  connector: sqlite
  path: {warehouse}
state:
  path: {state}
{lineage}retry:
  extract_max_attempts: 2
  load_max_attempts: 2
timeouts:
  extract_secs: 10
  transform_secs: 10
  load_secs: 10
"#,
            batch_size = opts.batch_size,
            threshold = opts.rejection_threshold_pct,
            validation = opts.contract_validation_enabled,
            landing = self.landing_dir().display(),
            warehouse = self.warehouse_path().display(),
            state = self.state_path().display(),
        )
    }

    /// Parse, validate, and run the rendered config with the real
    /// connectors. Partition-level failures come back inside the
    /// report, not as an `Err`.
    pub async fn run(&self, yaml: &str) -> Result<RunReport> {
        let config = parse_config_str(yaml).context("failed to parse config")?;
        validate_config(&config).context("failed to validate config")?;

        let extractor = Arc::new(JsonlSource::from_config(&config.extract));
        let loader = Arc::new(SqliteLoader::from_config(&config.load));
        let state = SqliteStateBackend::open(&config.state.path)
            .context("failed to open state database")?;
        let lineage = LineageEmitter::from_config(&config.lineage);

        let ctx = RunContext {
            config: Arc::new(config),
            state: Arc::new(state),
            extractor,
            loader,
            lineage,
            cancel: CancellationToken::new(),
        };
        run_source(&ctx, None).await.context("run failed")
    }

    // -- assertion helpers --------------------------------------------------

    pub fn warehouse_count(&self) -> Result<i64> {
        let conn = rusqlite::Connection::open(self.warehouse_path())?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{TARGET}\""),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Fetch one top-level field of the stored payload for a business key.
    pub fn warehouse_field(&self, key: &str, field: &str) -> Result<serde_json::Value> {
        let conn = rusqlite::Connection::open(self.warehouse_path())?;
        let payload: String = conn.query_row(
            &format!("SELECT payload FROM \"{TARGET}\" WHERE business_key = ?1"),
            [key],
            |row| row.get(0),
        )?;
        let value: serde_json::Value = serde_json::from_str(&payload)?;
        Ok(value.get(field).cloned().unwrap_or(serde_json::Value::Null))
    }

    pub fn stored_watermark(&self, partition: &str) -> Result<Option<String>> {
        let state = SqliteStateBackend::open(&self.state_path())?;
        let wm = state.get_watermark(&SourceName::new(SOURCE), &Partition::new(partition))?;
        Ok(wm.map(|w| w.value))
    }

    /// Row count of a state-database table (`job_runs`,
    /// `rejected_records`, `quality_metrics`).
    pub fn state_row_count(&self, table: &str) -> Result<i64> {
        let conn = rusqlite::Connection::open(self.state_path())?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    pub fn lineage_events(&self) -> Result<Vec<serde_json::Value>> {
        let raw = std::fs::read_to_string(self.lineage_path())
            .context("failed to read lineage log")?;
        raw.lines()
            .map(|line| serde_json::from_str(line).context("bad lineage event line"))
            .collect()
    }
}
