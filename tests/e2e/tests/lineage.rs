//! Lineage log written by the JSONL sink during real runs.

use tidemark_e2e::harness;

#[tokio::test]
async fn clean_runs_log_start_and_complete() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[
                harness::order_row("o-1", "2026-03-01T08:00:00Z", 10.0),
                harness::order_row("o-2", "2026-03-01T08:05:00Z", 20.0),
            ],
        )
        .expect("landing file must write");
    let report = context.run(&yaml).await.expect("run must complete");
    assert!(report.success());

    let events = context.lineage_events().expect("lineage log must parse");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["eventType"], "START");
    assert_eq!(events[1]["eventType"], "COMPLETE");

    let run_id = report.partitions[0].run_id;
    assert_eq!(events[0]["runId"], serde_json::json!(run_id));
    assert_eq!(events[1]["runId"], serde_json::json!(run_id));
    assert_eq!(events[0]["source"], "orders");
    assert_eq!(events[0]["input"]["namespace"], "jsonl");
    assert_eq!(events[0]["output"]["name"], harness::TARGET);
    assert_eq!(events[1]["outputStats"]["rowCount"], serde_json::json!(2));
}

#[tokio::test]
async fn failed_runs_log_a_fail_event() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    let yaml = context.config_yaml(&harness::ConfigOpts::default());

    let mut bad = harness::order_row("o-1", "2026-03-01T08:00:00Z", 1.0);
    bad.as_object_mut().expect("row is an object").remove("amount");
    context
        .write_landing_file("default", "batch-001.jsonl", &[bad])
        .expect("landing file must write");
    let report = context.run(&yaml).await.expect("run must complete");
    assert!(!report.success());

    let events = context.lineage_events().expect("lineage log must parse");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["eventType"], "START");
    assert_eq!(events[1]["eventType"], "FAIL");
    let error = events[1]["errorMessage"]
        .as_str()
        .expect("fail event carries an error");
    assert!(error.contains("exceeds threshold"), "unexpected error: {error}");
}
