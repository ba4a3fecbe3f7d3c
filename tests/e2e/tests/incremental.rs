//! Watermark behavior across consecutive runs over a growing landing zone.

use tidemark_e2e::harness;
use tidemark_types::run::RunStatus;

#[tokio::test]
async fn a_second_run_picks_up_only_new_records() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[
                harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0),
                harness::order_row("o-2", "2026-03-01T08:05:00Z", 20.0),
                harness::order_row("o-3", "2026-03-01T08:10:00Z", 30.0),
            ],
        )
        .expect("first landing file must write");
    let first = context.run(&yaml).await.expect("first run must complete");
    assert!(first.success());

    // The second delivery replays one already-loaded timestamp and adds
    // two genuinely new rows. Only the new rows are extracted.
    context
        .write_landing_file(
            "default",
            "batch-002.jsonl",
            &[
                harness::order_row("o-3", "2026-03-01T08:10:00Z", 30.0),
                harness::order_row("o-4", "2026-03-01T09:00:00Z", 40.0),
                harness::order_row("o-5", "2026-03-01T09:05:00Z", 50.0),
            ],
        )
        .expect("second landing file must write");
    let second = context.run(&yaml).await.expect("second run must complete");

    assert!(second.success());
    assert_eq!(second.partitions[0].counters.records_processed, 2);
    assert_eq!(second.partitions[0].counters.records_inserted, 2);
    assert_eq!(context.warehouse_count().expect("warehouse count"), 5);
    assert_eq!(
        context.stored_watermark("default").expect("watermark query"),
        Some("2026-03-01T09:05:00Z".to_string())
    );
}

#[tokio::test]
async fn an_unchanged_landing_zone_idles() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0)],
        )
        .expect("landing file must write");
    context.run(&yaml).await.expect("first run must complete");

    let second = context.run(&yaml).await.expect("second run must complete");

    assert!(second.success());
    assert_eq!(second.partitions[0].status, RunStatus::Success);
    assert_eq!(second.partitions[0].counters.records_processed, 0);
    assert_eq!(context.warehouse_count().expect("warehouse count"), 1);
    assert_eq!(
        context.stored_watermark("default").expect("watermark query"),
        Some("2026-03-01T08:00:00Z".to_string())
    );
    assert_eq!(context.state_row_count("job_runs").expect("job_runs count"), 2);
}

#[tokio::test]
async fn late_updates_overwrite_the_stored_row() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0)],
        )
        .expect("landing file must write");
    context.run(&yaml).await.expect("first run must complete");

    context
        .write_landing_file(
            "default",
            "batch-002.jsonl",
            &[harness::order_row("o-1", "2026-03-01T09:00:00Z", 12.5)],
        )
        .expect("update file must write");
    let second = context.run(&yaml).await.expect("second run must complete");

    assert!(second.success());
    assert_eq!(second.partitions[0].counters.records_updated, 1);
    assert_eq!(second.partitions[0].counters.records_inserted, 0);
    assert_eq!(context.warehouse_count().expect("warehouse count"), 1);
    assert_eq!(
        context.warehouse_field("o-1", "amount").expect("amount lookup"),
        serde_json::json!(12.5)
    );
}

#[tokio::test]
async fn partitions_advance_independent_watermarks() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts {
        partitions: vec!["region=eu".to_string(), "region=us".to_string()],
        ..harness::ConfigOpts::default()
    });

    context
        .write_landing_file(
            "region=eu",
            "batch-001.jsonl",
            &[harness::order_row("eu-1", "2026-03-01T08:00:00Z", 10.0)],
        )
        .expect("eu landing file must write");
    context
        .write_landing_file(
            "region=us",
            "batch-001.jsonl",
            &[harness::order_row("us-1", "2026-03-01T10:00:00Z", 20.0)],
        )
        .expect("us landing file must write");

    let first = context.run(&yaml).await.expect("first run must complete");
    assert!(first.success());
    assert_eq!(first.partitions.len(), 2);
    assert_eq!(
        context.stored_watermark("region=eu").expect("eu watermark"),
        Some("2026-03-01T08:00:00Z".to_string())
    );
    assert_eq!(
        context.stored_watermark("region=us").expect("us watermark"),
        Some("2026-03-01T10:00:00Z".to_string())
    );

    // New data for one region only; the other idles at its own mark.
    context
        .write_landing_file(
            "region=eu",
            "batch-002.jsonl",
            &[harness::order_row("eu-2", "2026-03-01T09:00:00Z", 30.0)],
        )
        .expect("eu update file must write");
    let second = context.run(&yaml).await.expect("second run must complete");

    let eu = second
        .partitions
        .iter()
        .find(|s| s.partition.as_str() == "region=eu")
        .expect("eu summary present");
    let us = second
        .partitions
        .iter()
        .find(|s| s.partition.as_str() == "region=us")
        .expect("us summary present");
    assert_eq!(eu.counters.records_processed, 1);
    assert_eq!(us.counters.records_processed, 0);
    assert_eq!(
        context.stored_watermark("region=eu").expect("eu watermark"),
        Some("2026-03-01T09:00:00Z".to_string())
    );
}
