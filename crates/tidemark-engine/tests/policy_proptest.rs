use proptest::prelude::*;
use serde_json::json;

use tidemark_engine::config::types::DedupConfig;
use tidemark_engine::config::{parse_config_str, validate_config};
use tidemark_engine::stages::dedup::dedup_batch;
use tidemark_engine::stages::validate::{validate_batch, ValidationVerdict};
use tidemark_types::record::{Payload, Record, Timestamp};

fn dedup_config() -> DedupConfig {
    DedupConfig {
        key_field: "id".to_string(),
        body_field: Some("items".to_string()),
        weight_payload: 4.0,
        weight_completeness: 2.0,
    }
}

/// Builds a record from a generation spec. The `seq` field keeps records
/// within the same key group distinguishable by content.
fn spec_record(key: u64, extras: usize, body: bool, ordinal: u64) -> Record {
    let mut payload = Payload::new();
    payload.insert("id".to_string(), json!(format!("k-{key}")));
    payload.insert(
        "updated_at".to_string(),
        json!(format!("2026-02-01T00:{:02}:{:02}Z", ordinal / 60, ordinal % 60)),
    );
    payload.insert("seq".to_string(), json!(ordinal));
    for i in 0..extras {
        payload.insert(format!("f{i}"), json!("x"));
    }
    if body {
        payload.insert("items".to_string(), json!([{"sku": "A", "qty": 1}]));
    }
    Record::from_payload(payload, "id", "updated_at", ordinal)
}

fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((0u64..6, 0usize..4, any::<bool>()), 1..40).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(ordinal, (key, extras, body))| spec_record(key, extras, body, ordinal as u64))
            .collect()
    })
}

fn arb_batch_split() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|total| (Just(total), 0..=total))
}

fn survivor_ids(records: &[Record]) -> Vec<(String, String, u64)> {
    records
        .iter()
        .map(|r| (r.dedup_key.clone(), r.content_hash.clone(), r.source_ordinal))
        .collect()
}

proptest! {
    #[test]
    fn dedup_survivors_are_input_order_invariant(records in arb_records().prop_shuffle()) {
        let config = dedup_config();
        let mut by_ordinal = records.clone();
        by_ordinal.sort_by_key(|r| r.source_ordinal);

        let shuffled = dedup_batch(records, &config);
        let ordered = dedup_batch(by_ordinal, &config);

        prop_assert_eq!(survivor_ids(&shuffled.records), survivor_ids(&ordered.records));
        prop_assert_eq!(shuffled.duplicates_found, ordered.duplicates_found);
    }

    #[test]
    fn dedup_keeps_exactly_one_record_per_key(records in arb_records()) {
        let total = records.len();
        let outcome = dedup_batch(records, &dedup_config());

        let mut keys: Vec<&str> = outcome.records.iter().map(|r| r.dedup_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        prop_assert_eq!(keys.len(), outcome.records.len());
        prop_assert_eq!(
            outcome.records.len() + outcome.duplicates_found as usize,
            total
        );
    }

    #[test]
    fn gate_trips_strictly_above_threshold(
        (total, bad) in arb_batch_split(),
        threshold_pct in prop::sample::select(vec![0.0, 5.0, 10.0, 33.3, 50.0, 100.0]),
    ) {
        let records: Vec<Record> = (0..total)
            .map(|i| {
                let mut payload = Payload::new();
                payload.insert("id".to_string(), json!(format!("r-{i}")));
                payload.insert(
                    "updated_at".to_string(),
                    json!(format!("2026-02-01T00:{:02}:{:02}Z", i / 60, i % 60)),
                );
                if i >= bad {
                    payload.insert("amount".to_string(), json!(9.99));
                }
                Record::from_payload(payload, "id", "updated_at", i as u64)
            })
            .collect();

        let required = vec!["amount".to_string()];
        let stamp = Timestamp::new("2026-02-01T01:00:00Z");
        let verdict = validate_batch(records, &required, "updated_at", threshold_pct, &stamp);

        // Same expression the gate uses, so the decision must agree exactly.
        let rate_pct = bad as f64 / total as f64 * 100.0;
        match verdict {
            ValidationVerdict::Gated { rejected_count, total: seen, .. } => {
                prop_assert!(rate_pct > threshold_pct);
                prop_assert_eq!(rejected_count, bad as u64);
                prop_assert_eq!(seen, total as u64);
            }
            ValidationVerdict::Passed { records, rejected } => {
                prop_assert!(rate_pct <= threshold_pct);
                prop_assert_eq!(records.len(), total - bad);
                prop_assert_eq!(rejected.len(), bad);
            }
        }
    }

    #[test]
    fn normalized_timestamps_order_lexicographically(
        a in arb_datetime(),
        b in arb_datetime(),
    ) {
        let (ta, sa) = a;
        let (tb, sb) = b;
        prop_assert_eq!(sa.cmp(&sb), ta.cmp(&tb));
    }

    #[test]
    fn rejection_threshold_must_be_a_percentage(raw in -500i32..1500) {
        let threshold = f64::from(raw) / 10.0;
        let yaml = format!(
            r#"
version: "1.0"
source:
  name: orders
  target: warehouse_orders
  watermark_column: updated_at
  rejection_threshold_pct: {threshold}
  dedup:
    key_field: order_id
extract:
  connector: jsonl
  path: ./landing/orders
load:
  connector: sqlite
  path: ./warehouse.db
state:
  path: ./state.db
"#
        );

        let config = parse_config_str(&yaml).expect("generated yaml must parse");
        let result = validate_config(&config);

        if (0.0..=100.0).contains(&threshold) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}

type DateTimeParts = (u32, u32, u32, u32, u32, u32);

fn arb_datetime() -> impl Strategy<Value = (DateTimeParts, String)> {
    (
        2020u32..2030,
        1u32..=12,
        1u32..=28,
        0u32..24,
        0u32..60,
        0u32..60,
    )
        .prop_map(|(y, mo, d, h, mi, s)| {
            let rendered = format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z");
            ((y, mo, d, h, mi, s), rendered)
        })
}
