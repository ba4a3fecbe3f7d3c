//! Semantic validation for parsed ingestion configuration values.

use anyhow::{bail, Result};

use crate::config::types::{IngestConfig, LineageSinkKind, MaskStrategy, MaskingConfig};

/// Validate masking rules.
fn validate_masking(masking: &MaskingConfig, errors: &mut Vec<String>) {
    for (i, rule) in masking.rules.iter().enumerate() {
        if rule.field.trim().is_empty() {
            errors.push(format!("masking.rules[{i}]: field must not be empty"));
        }
        if rule.strategy == MaskStrategy::Truncate && rule.max_len == 0 {
            errors.push(format!(
                "masking.rules[{i}]: truncate max_len must be at least 1"
            ));
        }
    }
}

/// Validate a parsed ingestion configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &IngestConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.source.name.trim().is_empty() {
        errors.push("Source name must not be empty".to_string());
    }

    if config.source.target.trim().is_empty() {
        errors.push("Source target must not be empty".to_string());
    }

    if config.source.watermark_column.trim().is_empty() {
        errors.push("Source watermark_column must not be empty".to_string());
    }

    if config.source.batch_size == 0 {
        errors.push("batch_size must be at least 1".to_string());
    }

    if !(0.0..=100.0).contains(&config.source.rejection_threshold_pct) {
        errors.push(format!(
            "rejection_threshold_pct must be between 0 and 100, got {}",
            config.source.rejection_threshold_pct
        ));
    }

    if config.source.dedup.key_field.trim().is_empty() {
        errors.push("dedup.key_field must not be empty".to_string());
    } else if config.source.dedup.key_field == "content_hash" {
        errors.push(
            "dedup.key_field must name a business identifier field, not content_hash".to_string(),
        );
    }

    for (name, weight) in [
        ("weight_payload", config.source.dedup.weight_payload),
        ("weight_completeness", config.source.dedup.weight_completeness),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            errors.push(format!("dedup.{name} must be finite and non-negative, got {weight}"));
        }
    }

    if config.source.contract_validation_enabled && config.source.contract.required.is_empty() {
        errors.push(
            "contract validation is enabled but contract.required lists no fields".to_string(),
        );
    }

    validate_masking(&config.source.masking, &mut errors);

    let mut seen_partitions = std::collections::HashSet::new();
    for (i, partition) in config.source.partitions.iter().enumerate() {
        if partition.trim().is_empty() {
            errors.push(format!("partitions[{i}] must not be empty"));
        } else if !seen_partitions.insert(partition.as_str()) {
            errors.push(format!("partitions[{i}]: duplicate partition '{partition}'"));
        }
    }

    if config.extract.connector.trim().is_empty() {
        errors.push("extract.connector must not be empty".to_string());
    }

    if config.extract.path.as_os_str().is_empty() {
        errors.push("extract.path must not be empty".to_string());
    }

    if config.extract.max_parallel_reads == 0 {
        errors.push("extract.max_parallel_reads must be at least 1".to_string());
    }

    if config.load.connector.trim().is_empty() {
        errors.push("load.connector must not be empty".to_string());
    }

    if config.load.path.as_os_str().is_empty() {
        errors.push("load.path must not be empty".to_string());
    }

    if config.state.path.as_os_str().is_empty() {
        errors.push("state.path must not be empty".to_string());
    }

    if config.lineage.sink == LineageSinkKind::Jsonl && config.lineage.path.is_none() {
        errors.push("lineage.sink 'jsonl' requires lineage.path".to_string());
    }

    if config.retry.extract_max_attempts == 0 {
        errors.push("retry.extract_max_attempts must be at least 1".to_string());
    }

    if config.retry.load_max_attempts == 0 {
        errors.push("retry.load_max_attempts must be at least 1".to_string());
    }

    if config.timeouts.extract_secs == 0 {
        errors.push("timeouts.extract_secs must be at least 1".to_string());
    }

    if config.timeouts.transform_secs == 0 {
        errors.push("timeouts.transform_secs must be at least 1".to_string());
    }

    if config.timeouts.load_secs == 0 {
        errors.push("timeouts.load_secs must be at least 1".to_string());
    }

    if config.runtime.max_concurrent_partitions == 0 {
        errors.push("runtime.max_concurrent_partitions must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}
