//! Router delivering to file-backed sinks.

use std::sync::Arc;

use rtm_core::{
    CheckpointKind, Diagnostic, DiagnosticKind, EntityClass, EntityKey, Interval, Severity,
    SinkRecord, Timestamp,
};
use rtm_persistence::{JsonLinesSink, MemorySink, SqliteSink};
use rtm_router::{RouterConfig, RoutingRule, SinkRoute, StorageRouter};
use tempfile::TempDir;

fn interval(round: usize) -> Arc<SinkRecord> {
    Arc::new(SinkRecord::Interval(
        Interval::new(
            EntityKey::new(EntityClass::TableApi, "blackjack", "BJ-07", format!("r{round}")),
            CheckpointKind::Deal,
            CheckpointKind::Finish,
            1.5,
            Timestamp::from_secs(16.0),
        )
        .annotated(false, None),
    ))
}

#[tokio::test]
async fn test_shutdown_delivers_to_every_sink() {
    let temp_dir = TempDir::new().unwrap();
    let jsonl = Arc::new(
        JsonLinesSink::new("jsonl", temp_dir.path().join("jsonl"), "roundtime").unwrap(),
    );
    let sqlite = Arc::new(SqliteSink::open("sqlite", temp_dir.path().join("rtm.db")).unwrap());
    let errors = Arc::new(MemorySink::new("errors"));

    let router = StorageRouter::configure(
        vec![
            SinkRoute::new(jsonl.clone(), RoutingRule::default()),
            SinkRoute::new(sqlite.clone(), RoutingRule::intervals_only()),
            SinkRoute::new(errors.clone(), RoutingRule::diagnostics_only(Severity::Warning)),
        ],
        RouterConfig {
            flush_interval_ms: 60_000,
            ..Default::default()
        },
    )
    .unwrap();
    router.start().unwrap();

    for n in 0..10 {
        router.route(interval(n));
    }
    router.route(Arc::new(SinkRecord::Diagnostic(Diagnostic::new(
        Severity::Warning,
        DiagnosticKind::SequenceGap,
        "expected betstop, got deal",
    ))));

    let path = temp_dir
        .path()
        .join("jsonl")
        .join(format!("roundtime_{}.jsonl", chrono::Utc::now().format("%Y-%m-%d")));

    let stats = router.shutdown().await;
    assert!(stats.iter().all(|s| s.queued == 0 && s.dropped_shutdown == 0));

    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 11);
    assert_eq!(errors.diagnostics().len(), 1);
    assert!(errors.is_closed());

    // Closed on shutdown; reopen to inspect.
    let reopened = SqliteSink::open("check", temp_dir.path().join("rtm.db")).unwrap();
    assert_eq!(reopened.interval_count().unwrap(), 10);
    assert_eq!(reopened.diagnostic_count().unwrap(), 0);
}
