//! End-to-end runs against the in-memory connector.

mod common;

use common::{fast_config, Behavior, FakeConnector};
use loadgen_core::{OpKind, RunPlan, WorkloadKind, WorkloadSpec};
use loadgen_engine::{Engine, RunHandle};
use loadgen_metrics::{JsonLinesExporter, MetricsAggregator, RunTermination};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn basic_workload() -> WorkloadSpec {
    WorkloadSpec::new(WorkloadKind::Single, Vec::new())
        .with_weights([(OpKind::Get, 0.7), (OpKind::Set, 0.3)])
}

fn launch(
    plan: RunPlan,
    workload: WorkloadSpec,
    connector: FakeConnector,
) -> (RunHandle, Arc<MetricsAggregator>) {
    let aggregator = Arc::new(MetricsAggregator::new());
    let handle = Engine::new(
        plan,
        fast_config(),
        workload,
        connector,
        Arc::clone(&aggregator),
    )
    .with_report_interval(None)
    .with_seed(42)
    .start()
    .unwrap();
    (handle, aggregator)
}

#[test]
fn test_concurrency_bounded_by_pool_size() {
    let connector = FakeConnector::new(Behavior {
        latency: Duration::from_millis(2),
        ..Default::default()
    });
    let stats = Arc::clone(&connector.stats);
    let plan = RunPlan::new(1, 3, 12).with_duration(Some(Duration::from_millis(500)));
    let (handle, _) = launch(plan, basic_workload(), connector);

    let summary = handle.await_completion();
    assert_eq!(summary.termination, RunTermination::Completed);
    assert!(summary.total_operations > 0);
    assert!(stats.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(
        summary.total_operations,
        summary.successful_operations + summary.failed_operations
    );
}

#[test]
fn test_snapshots_stay_consistent_while_running() {
    let plan = RunPlan::new(2, 2, 4);
    let (handle, _) = launch(plan, basic_workload(), FakeConnector::new(Behavior::default()));

    for _ in 0..10 {
        thread::sleep(Duration::from_millis(20));
        let snapshot = handle.current_snapshot();
        for (name, op) in &snapshot.operations {
            assert_eq!(op.total, op.success + op.errors, "{name}");
            assert!(op.p50_ms <= op.p95_ms && op.p95_ms <= op.p99_ms, "{name}");
        }
    }
    handle.stop();
}

#[test]
fn test_stop_is_graceful() {
    let connector = FakeConnector::new(Behavior {
        latency: Duration::from_millis(1),
        ..Default::default()
    });
    let stats = Arc::clone(&connector.stats);
    let plan = RunPlan::new(2, 2, 4);
    let (handle, _) = launch(plan, basic_workload(), connector);
    thread::sleep(Duration::from_millis(300));
    assert!(!handle.is_finished());

    let started = Instant::now();
    let summary = handle.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.termination, RunTermination::Stopped);
    assert!(summary.total_operations > 0);

    assert!(handle.is_finished());
    assert_eq!(handle.live_workers(), 0);
    for health in handle.pool_health() {
        assert_eq!(health.checked_out, 0);
        assert_eq!(health.closed, 2);
    }
    assert_eq!(stats.open_clients.load(Ordering::SeqCst), 0);

    // A second stop returns the same summary.
    assert_eq!(handle.stop(), summary);
}

#[test]
fn test_reconnects_after_initial_failures() {
    let connector = FakeConnector::new(Behavior {
        connect_failures_per_node: 3,
        nodes: 1024,
        ..Default::default()
    });
    let plan = RunPlan::new(1, 2, 4);
    let (handle, _) = launch(plan, basic_workload(), connector);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let connected: usize = handle.pool_health().iter().map(|h| h.connected).sum();
        if connected == 2 {
            break;
        }
        assert!(Instant::now() < deadline, "managers never reconnected");
        thread::sleep(Duration::from_millis(20));
    }
    let summary = handle.stop();

    assert_eq!(summary.reconnection_count, 2);
    assert!(summary.connection_drops >= 2);
    assert_eq!(summary.hard_connection_failures, 0);
    assert_eq!(summary.connection_failures, 6);
    assert!(summary.avg_reconnection_ms > 0.0);
    assert!(summary.successful_operations > 0);
}

#[test]
fn test_aborts_when_every_connection_gives_up() {
    let connector = FakeConnector::new(Behavior {
        refuse_all: true,
        ..Default::default()
    });
    let plan = RunPlan::new(2, 2, 2);
    let (handle, _) = launch(plan, basic_workload(), connector);

    let summary = handle
        .await_completion_timeout(Duration::from_secs(10))
        .expect("run should abort on its own");
    assert_eq!(summary.termination, RunTermination::Aborted);
    assert_eq!(summary.hard_connection_failures, 4);
    assert_eq!(summary.successful_operations, 0);
    assert_eq!(handle.live_workers(), 0);
}

#[test]
fn test_rate_limit_is_honoured() {
    let plan = RunPlan::new(1, 1, 1)
        .with_duration(Some(Duration::from_secs(2)))
        .with_target_ops_per_second(Some(100));
    let (handle, _) = launch(plan, basic_workload(), FakeConnector::new(Behavior::default()));

    let summary = handle.await_completion();
    assert!(
        (180..=220).contains(&summary.total_operations),
        "got {} ops",
        summary.total_operations
    );
}

#[test]
fn test_rate_limit_is_shared_by_pool_threads() {
    let plan = RunPlan::new(1, 2, 4)
        .with_duration(Some(Duration::from_secs(1)))
        .with_target_ops_per_second(Some(100));
    let (handle, _) = launch(plan, basic_workload(), FakeConnector::new(Behavior::default()));

    let summary = handle.await_completion();
    assert!(
        summary.total_operations <= 115,
        "got {} ops",
        summary.total_operations
    );
}

#[test]
fn test_pubsub_run_counts_received_messages() {
    let workload = WorkloadSpec::new(WorkloadKind::PubSub, Vec::new())
        .with_weights([(OpKind::Publish, 0.8), (OpKind::Subscribe, 0.2)])
        .with_channels(vec!["alerts".into()]);
    let plan = RunPlan::new(1, 1, 2).with_duration(Some(Duration::from_millis(600)));
    let connector = FakeConnector::new(Behavior::default());
    let stats = Arc::clone(&connector.stats);
    let (handle, _) = launch(plan, workload, connector);

    let summary = handle.await_completion();
    assert!(summary.operations.contains_key("PUBLISH"));
    assert!(summary.messages_received > 0);
    assert!(summary.channels.contains_key("alerts"));
    // At most one listener per worker.
    assert!(stats.subscriptions.load(Ordering::SeqCst) <= 2);
}

#[test]
fn test_jsonl_exporter_receives_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.jsonl");
    let exporter = JsonLinesExporter::create(&path).unwrap();

    let aggregator = Arc::new(MetricsAggregator::new());
    let handle = Engine::new(
        RunPlan::new(1, 1, 1).with_duration(Some(Duration::from_millis(450))),
        fast_config(),
        basic_workload(),
        FakeConnector::new(Behavior::default()),
        aggregator,
    )
    .with_report_interval(Some(Duration::from_millis(100)))
    .quiet(true)
    .with_exporter(Box::new(exporter))
    .start()
    .unwrap();
    handle.await_completion();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert!(lines.len() >= 2, "only {} batch(es)", lines.len());
    let last: serde_json::Value = serde_json::from_str(lines[lines.len() - 1]).unwrap();
    assert!(last["counters"].as_array().is_some_and(|c| !c.is_empty()));
}

#[test]
fn test_invalid_plan_is_rejected() {
    let aggregator = Arc::new(MetricsAggregator::new());
    let result = Engine::new(
        RunPlan::new(0, 1, 1),
        fast_config(),
        basic_workload(),
        FakeConnector::new(Behavior::default()),
        aggregator,
    )
    .start();
    assert!(result.is_err());

    let result = Engine::new(
        RunPlan::new(1, 1, 1),
        fast_config(),
        WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Subscribe]),
        FakeConnector::new(Behavior::default()),
        Arc::new(MetricsAggregator::new()),
    )
    .start();
    assert!(result.is_err());
}

#[test]
fn test_manager_state_visible_through_health() {
    let plan = RunPlan::new(1, 2, 2);
    let (handle, _) = launch(plan, basic_workload(), FakeConnector::new(Behavior::default()));
    thread::sleep(Duration::from_millis(100));
    let health = &handle.pool_health()[0];
    assert_eq!(health.total(), 2);
    assert!(health.connected >= 1);
    handle.stop();
    assert_eq!(handle.pool_health()[0].closed, 2);
}
