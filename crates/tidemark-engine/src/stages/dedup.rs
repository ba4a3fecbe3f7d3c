//! Deduplication stage.
//!
//! Collapses records sharing a business dedup key down to one survivor per
//! key. Grouping is always by the business key, never by content hash: two
//! versions of the same entity differ in content but are still duplicates.
//!
//! Survivor choice is deterministic for a given batch regardless of input
//! order, so re-running the same batch always loads the same rows.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tidemark_types::record::{is_populated, Record};

use crate::config::types::DedupConfig;

/// Outcome of deduplicating one batch.
#[derive(Debug)]
pub struct DedupOutcome {
    /// Survivors plus any keyless records, ordered by source ordinal.
    pub records: Vec<Record>,
    pub duplicates_found: u64,
}

/// Ranking score for one duplicate candidate. A populated body field
/// dominates, then overall field completeness.
#[allow(clippy::cast_precision_loss)]
fn score(record: &Record, config: &DedupConfig) -> f64 {
    let body_term = config
        .body_field
        .as_deref()
        .and_then(|field| record.payload.get(field))
        .is_some_and(is_populated);
    let body_score = if body_term { config.weight_payload } else { 0.0 };
    body_score + config.weight_completeness * record.populated_field_count() as f64
}

/// True when candidate `a` outranks candidate `b`.
///
/// Ties on score fall back to larger payload, then later source ordinal,
/// then lexicographically smaller content hash. Ordinals are unique within
/// a batch, so two distinct records never tie all the way down.
fn outranks(a: &Record, score_a: f64, b: &Record, score_b: f64) -> bool {
    score_a
        .total_cmp(&score_b)
        .then_with(|| a.size_bytes.cmp(&b.size_bytes))
        .then_with(|| a.source_ordinal.cmp(&b.source_ordinal))
        .then_with(|| b.content_hash.cmp(&a.content_hash))
        .is_gt()
}

/// Deduplicate one batch by business key.
///
/// Records with an empty dedup key cannot be grouped and pass through
/// unchanged. Output order is ascending source ordinal, which makes the
/// result independent of how the input happened to be arranged.
#[must_use]
pub fn dedup_batch(records: Vec<Record>, config: &DedupConfig) -> DedupOutcome {
    let total = records.len();
    let mut keyless = Vec::new();
    let mut groups: HashMap<String, (Record, f64)> = HashMap::new();
    let mut dropped = 0_usize;

    for record in records {
        if record.dedup_key.is_empty() {
            keyless.push(record);
            continue;
        }

        let record_score = score(&record, config);
        match groups.entry(record.dedup_key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert((record, record_score));
            }
            Entry::Occupied(mut slot) => {
                dropped += 1;
                let best = slot.get_mut();
                if outranks(&record, record_score, &best.0, best.1) {
                    *best = (record, record_score);
                }
            }
        }
    }

    let mut survivors: Vec<Record> = groups.into_values().map(|(record, _)| record).collect();
    survivors.extend(keyless);
    survivors.sort_by_key(|r| r.source_ordinal);

    debug_assert_eq!(survivors.len() + dropped, total);

    DedupOutcome {
        records: survivors,
        duplicates_found: dropped as u64,
    }
}
