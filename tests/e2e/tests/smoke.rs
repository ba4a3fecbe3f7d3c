use tidemark_e2e::harness;

#[tokio::test]
async fn a_clean_landing_file_reaches_the_warehouse() {
    let context = harness::bootstrap().expect("bootstrap must initialize fixtures");
    context
        .write_landing_file(
            "default",
            "batch-001.jsonl",
            &[
                harness::order_row("o-1", "2026-03-01T08:00:00Z", 19.5),
                harness::order_row("o-2", "2026-03-01T08:05:00Z", 42.0),
                harness::order_row("o-3", "2026-03-01T08:10:00Z", 7.25),
            ],
        )
        .expect("landing file write must succeed");

    let yaml = context.config_yaml(&harness::ConfigOpts::default());
    let report = context.run(&yaml).await.expect("run must complete");

    assert!(report.success(), "clean run should succeed: {report:?}");
    assert_eq!(report.partitions.len(), 1);
    let summary = &report.partitions[0];
    assert_eq!(summary.counters.records_processed, 3);
    assert_eq!(summary.counters.records_inserted, 3);
    assert_eq!(summary.counters.records_failed, 0);

    assert_eq!(context.warehouse_count().expect("warehouse count"), 3);
    assert_eq!(
        context.stored_watermark("default").expect("watermark query"),
        Some("2026-03-01T08:10:00Z".to_string())
    );
    assert_eq!(context.state_row_count("job_runs").expect("job_runs count"), 1);
}
