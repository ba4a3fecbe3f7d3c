//! Contract gating, masking, deduplication, and quality recording
//! through the real connector stack.

use rstest::rstest;
use tidemark_e2e::harness;
use tidemark_types::run::RunStatus;

fn masking_block(strategy: &str) -> String {
    format!(
        "    salt: pepper\n    rules:\n      - field: email\n        strategy: {strategy}"
    )
}

#[rstest]
#[case("hash")]
#[case("redact")]
#[case("truncate")]
#[tokio::test]
async fn masking_strategy_matrix_rewrites_email(#[case] strategy: &str) {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts {
        masking_block: Some(masking_block(strategy)),
        ..harness::ConfigOpts::default()
    });

    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0)],
        )
        .expect("landing file must write");
    let report = context.run(&yaml).await.expect("run must complete");
    assert!(report.success(), "masked run should succeed: {report:?}");

    let email = context
        .warehouse_field("o-1", "email")
        .expect("email lookup");
    let email = email.as_str().expect("email should remain a string");
    match strategy {
        "hash" => {
            assert_eq!(email.len(), 64);
            assert!(email.chars().all(|c| c.is_ascii_hexdigit()));
        }
        "redact" => assert_eq!(email, "[REDACTED]"),
        "truncate" => assert_eq!(email, "o-1@"),
        other => panic!("unexpected strategy {other}"),
    }
    assert_ne!(email, "o-1@example.com");
}

#[tokio::test]
async fn a_gate_breach_stops_the_load() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    // Two of three rows are missing the required amount: a 66% rejection
    // rate against a 10% threshold.
    let mut bad_one = harness::order_row("o-1", "2026-03-01T08:00:00Z", 1.0);
    bad_one.as_object_mut().expect("row is an object").remove("amount");
    let mut bad_two = harness::order_row("o-2", "2026-03-01T08:05:00Z", 1.0);
    bad_two.as_object_mut().expect("row is an object").remove("amount");
    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[
                bad_one,
                bad_two,
                harness::order_row("o-3", "2026-03-01T08:10:00Z", 30.0),
            ],
        )
        .expect("landing file must write");

    let report = context.run(&yaml).await.expect("run must complete");

    assert!(!report.success());
    let summary = &report.partitions[0];
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.counters.records_failed, 3);
    let error = summary.error_message.as_deref().expect("gate error recorded");
    assert!(error.contains("exceeds threshold"), "unexpected error: {error}");

    // Nothing was loaded and the watermark never moved; the rejected
    // rows are quarantined in the state database.
    assert!(!context.warehouse_path().exists());
    assert_eq!(context.stored_watermark("default").expect("watermark query"), None);
    assert_eq!(
        context.state_row_count("rejected_records").expect("rejected count"),
        2
    );
}

#[tokio::test]
async fn rejections_below_the_threshold_are_quarantined() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts {
        rejection_threshold_pct: 50.0,
        ..harness::ConfigOpts::default()
    });

    let mut bad = harness::order_row("o-2", "2026-03-01T08:05:00Z", 1.0);
    bad.as_object_mut().expect("row is an object").remove("amount");
    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[
                harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0),
                bad,
                harness::order_row("o-3", "2026-03-01T08:10:00Z", 30.0),
                harness::order_row("o-4", "2026-03-01T08:15:00Z", 40.0),
            ],
        )
        .expect("landing file must write");

    let report = context.run(&yaml).await.expect("run must complete");

    assert!(report.success());
    let summary = &report.partitions[0];
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.counters.records_processed, 4);
    assert_eq!(summary.counters.records_failed, 1);
    assert_eq!(summary.counters.records_inserted, 3);

    assert_eq!(context.warehouse_count().expect("warehouse count"), 3);
    assert_eq!(
        context.state_row_count("rejected_records").expect("rejected count"),
        1
    );
    assert_eq!(
        context.stored_watermark("default").expect("watermark query"),
        Some("2026-03-01T08:15:00Z".to_string())
    );
}

#[tokio::test]
async fn duplicate_keys_collapse_to_the_richest_payload() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    // Same business key twice: a bare retry without the order body, then
    // the full version. Only the full version may reach the warehouse.
    let bare = serde_json::json!({
        "order_id": "o-1",
        "updated_at": "2026-03-01T08:30:00Z",
        "amount": 10.0,
    });
    let full = harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0);
    context
        .write_landing_file("default", "batch-001.jsonl", &[bare, full])
        .expect("landing file must write");

    let report = context.run(&yaml).await.expect("run must complete");

    assert!(report.success());
    let summary = &report.partitions[0];
    assert_eq!(summary.counters.records_processed, 2);
    assert_eq!(summary.counters.duplicates_found, 1);
    assert_eq!(summary.counters.records_inserted, 1);
    assert_eq!(context.warehouse_count().expect("warehouse count"), 1);
    assert!(
        context.warehouse_field("o-1", "items").expect("items lookup").is_array(),
        "survivor should be the full payload"
    );
    // The watermark covers everything extracted, including the loser.
    assert_eq!(
        context.stored_watermark("default").expect("watermark query"),
        Some("2026-03-01T08:30:00Z".to_string())
    );
}

#[tokio::test]
async fn every_finalized_run_records_quality_metrics() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0)],
        )
        .expect("landing file must write");
    context.run(&yaml).await.expect("run must complete");

    assert_eq!(
        context.state_row_count("quality_metrics").expect("quality count"),
        1
    );
}
