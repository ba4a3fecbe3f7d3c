//! Per-file JSONL scanning.

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use tidemark_types::error::StageError;
use tidemark_types::record::{field_as_string, Payload};

/// One line that survived parsing and the watermark filter.
#[derive(Debug)]
pub(crate) struct ScannedRow {
    pub watermark_value: String,
    pub file: String,
    pub line: u64,
    pub payload: Payload,
}

/// Scan result for one file.
#[derive(Debug, Default)]
pub(crate) struct FileScan {
    pub rows: Vec<ScannedRow>,
    pub lines_skipped: u64,
}

/// Read one JSONL file, keeping rows strictly newer than the watermark.
///
/// Blank lines are ignored. Lines that do not parse to a JSON object, or
/// that lack a usable watermark value, are counted as skipped and logged;
/// a batch must never fail because one line is broken.
pub(crate) async fn scan_file(
    path: &Path,
    watermark: Option<&str>,
    watermark_column: &str,
) -> Result<FileScan, StageError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StageError::transient_io("extract", &e))?;
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut scan = FileScan::default();
    for (idx, raw) in content.lines().enumerate() {
        let line = idx as u64 + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let payload = match parse_object(raw) {
            Ok(payload) => payload,
            Err(reason) => {
                warn!(file = %file, line, %reason, "Skipping unparseable line");
                scan.lines_skipped += 1;
                continue;
            }
        };
        let Some(watermark_value) = field_as_string(&payload, watermark_column) else {
            warn!(
                file = %file,
                line,
                watermark_column,
                "Skipping record without a watermark value"
            );
            scan.lines_skipped += 1;
            continue;
        };
        if let Some(current) = watermark {
            if watermark_value.as_str() <= current {
                continue;
            }
        }
        scan.rows.push(ScannedRow {
            watermark_value,
            file: file.clone(),
            line,
            payload,
        });
    }
    Ok(scan)
}

fn parse_object(raw: &str) -> Result<Payload, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
