//! End-to-end runs of the binary's runner against an in-process RESP server.

use kv_loadgen::config::{RunnerConfig, TestConfig};
use kv_loadgen::runner;
use loadgen_core::{ConnectionConfig, OpKind, RunPlan, WorkloadKind, WorkloadSpec};
use loadgen_metrics::RunTermination;
use resp_client::{read_value, Value};
use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

fn command_name(value: Value) -> Option<String> {
    match value {
        Value::Array(Some(items)) => match items.into_iter().next() {
            Some(Value::Bulk(Some(name))) => Some(String::from_utf8_lossy(&name).to_uppercase()),
            _ => None,
        },
        _ => None,
    }
}

fn handle(stream: TcpStream) {
    let Ok(mut writer) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(stream);
    while let Ok(value) = read_value(&mut reader) {
        let reply: &[u8] = match command_name(value).as_deref() {
            Some("PING") => b"+PONG\r\n",
            Some("GET") => b"$-1\r\n",
            Some("DEL") | Some("INCR") => b":1\r\n",
            _ => b"+OK\r\n",
        };
        if writer.write_all(reply).is_err() {
            return;
        }
    }
}

/// Accepts any number of connections and answers every command.
fn server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || handle(stream));
        }
    });
    port
}

fn config(port: u16) -> RunnerConfig {
    let mut config = RunnerConfig {
        connection: ConnectionConfig::new("127.0.0.1", port)
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2)),
        test: TestConfig {
            profile: None,
            plan: RunPlan::new(1, 2, 3).with_duration(Some(Duration::from_secs(1))),
            workload: WorkloadSpec::new(WorkloadKind::Single, Vec::new())
                .with_weights([(OpKind::Set, 0.5), (OpKind::Get, 0.4), (OpKind::Del, 0.1)]),
        },
        ..Default::default()
    };
    config.output.quiet = true;
    config.output.metrics_interval = 1;
    config.identity.run_id = Some("e2e".to_string());
    config
}

#[tokio::test]
async fn test_run_to_completion() {
    let port = server();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(port);
    config.export.file = Some(dir.path().join("metrics.jsonl"));

    let summary = runner::run(&config, Some(1)).await.unwrap();
    assert_eq!(summary.termination, RunTermination::Completed);
    assert!(summary.total_operations > 0);
    assert_eq!(summary.failed_operations, 0);
    assert_eq!(summary.identity.run_id, "e2e");
    assert_eq!(summary.identity.app_name, "rust-custom");
    assert!(summary.operations.contains_key("SET"));

    let lines = std::fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
    assert!(lines.lines().count() >= 1);
    assert!(lines.contains("\"run_id\":\"e2e\""));
}

#[test]
fn test_pipelined_run_with_handle() {
    let port = server();
    let mut config = config(port);
    config.test.workload = config
        .test
        .workload
        .clone()
        .with_pipeline_size(8);
    config.test.workload.kind = WorkloadKind::Pipelined;
    config.test.plan = config.test.plan.clone().with_duration(None);

    let handle = runner::start(&config, None).unwrap();
    thread::sleep(Duration::from_millis(300));
    let snapshot = handle.current_snapshot();
    assert!(snapshot.total_operations() > 0);
    let summary = handle.stop();
    assert_eq!(summary.termination, RunTermination::Stopped);
    assert_eq!(summary.total_operations % 8, 0);
}

#[test]
fn test_invalid_config_does_not_start() {
    let mut config = config(1);
    config.test.plan.threads_per_pool = 0;
    assert!(runner::start(&config, None).is_err());
}

#[test]
fn test_connection_check() {
    let port = server();
    let report = runner::test_connection(&ConnectionConfig::new("127.0.0.1", port)).unwrap();
    assert_eq!(report.target, format!("redis://127.0.0.1:{port}/0"));
    assert_eq!(report.nodes, 1);
}

#[test]
fn test_connection_check_reports_refusal() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ConnectionConfig::new("127.0.0.1", port)
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(500));
    let err = runner::test_connection(&config).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to connect"));
}
