//! Runs a load test described by a [`RunnerConfig`].

use crate::config::RunnerConfig;
use anyhow::Context;
use loadgen_core::{Connector, KvClient};
use loadgen_engine::{Engine, RunHandle};
use loadgen_metrics::{
    HttpPushExporter, JsonLinesExporter, MetricsAggregator, MetricsExporter, RunSummary,
};
use resp_client::RespConnector;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Build the exporters named in the config.
pub fn build_exporters(config: &RunnerConfig) -> anyhow::Result<Vec<Box<dyn MetricsExporter>>> {
    let mut exporters: Vec<Box<dyn MetricsExporter>> = Vec::new();
    if let Some(endpoint) = &config.export.endpoint {
        let exporter = HttpPushExporter::new(endpoint)
            .with_context(|| format!("Invalid export endpoint: {endpoint}"))?;
        tracing::info!("Pushing metrics to {}", exporter.endpoint());
        exporters.push(Box::new(exporter));
    }
    if let Some(path) = &config.export.file {
        let exporter = JsonLinesExporter::create(path)
            .with_context(|| format!("Failed to open metrics file: {}", path.display()))?;
        tracing::info!("Appending metrics to {}", path.display());
        exporters.push(Box::new(exporter));
    }
    Ok(exporters)
}

/// Start the engine without waiting for it.
pub fn start(config: &RunnerConfig, seed: Option<u64>) -> anyhow::Result<RunHandle> {
    config.validate()?;
    let identity = config.identity.resolve(config.test.profile);
    tracing::info!(
        "Run {} ({}), instance {}",
        identity.run_id,
        identity.app_name,
        identity.instance_id
    );

    let connector = RespConnector::new(config.connection.clone())
        .context("Failed to prepare the connection settings")?;
    let interval = Some(Duration::from_secs(config.output.metrics_interval));

    let mut engine = Engine::new(
        config.test.plan.clone(),
        config.connection.clone(),
        config.test.workload.clone(),
        connector,
        Arc::new(MetricsAggregator::new()),
    )
    .with_report_interval(interval)
    .quiet(config.output.quiet)
    .with_identity(identity);
    for exporter in build_exporters(config)? {
        engine = engine.with_exporter(exporter);
    }
    if let Some(seed) = seed {
        engine = engine.with_seed(seed);
    }
    engine.start().context("Failed to start the load test")
}

/// Run to completion, stopping early on Ctrl-C. The summary is returned either way.
pub async fn run(config: &RunnerConfig, seed: Option<u64>) -> anyhow::Result<RunSummary> {
    let handle = start(config, seed)?;

    let waiter = {
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || handle.await_completion())
    };

    let summary = tokio::select! {
        summary = waiter => summary.context("Run supervisor task failed")?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for Ctrl-C: {e}");
            }
            tracing::info!("Interrupt received, stopping workers");
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || handle.stop())
                .await
                .context("Shutdown task failed")?
        }
    };
    Ok(summary)
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub target: String,
    pub nodes: usize,
    pub connect_time: Duration,
    pub ping_time: Duration,
}

/// Connect to the first node and PING it.
pub fn test_connection(config: &loadgen_core::ConnectionConfig) -> anyhow::Result<ConnectionReport> {
    config.validate()?;
    let connector = RespConnector::new(config.clone())
        .context("Failed to prepare the connection settings")?;
    let target = connector.describe();

    let start = Instant::now();
    let mut client = connector
        .connect(0)
        .with_context(|| format!("Failed to connect to {target}"))?;
    let connect_time = start.elapsed();

    let start = Instant::now();
    client
        .ping()
        .with_context(|| format!("PING to {target} failed"))?;
    let ping_time = start.elapsed();
    client.close();

    Ok(ConnectionReport {
        target,
        nodes: connector.node_count(),
        connect_time,
        ping_time,
    })
}
