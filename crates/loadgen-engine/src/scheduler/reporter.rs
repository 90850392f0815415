use super::stop::StopSignal;
use crate::error::EngineError;
use loadgen_metrics::report::stats_line;
use loadgen_metrics::{ExportBatch, MetricsAggregator, MetricsExporter, RunIdentity};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Periodic stats logging and metric export on its own thread.
pub(crate) struct Reporter {
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct ReporterConfig {
    pub(crate) interval: Duration,
    pub(crate) quiet: bool,
    pub(crate) identity: RunIdentity,
}

impl Reporter {
    pub(crate) fn spawn(
        config: ReporterConfig,
        aggregator: Arc<MetricsAggregator>,
        exporters: Vec<Box<dyn MetricsExporter>>,
    ) -> Result<Self, EngineError> {
        let stop = Arc::new(StopSignal::new());
        let thread_stop = Arc::clone(&stop);
        let name = "metrics-reporter".to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || report_loop(config, &aggregator, exporters, &thread_stop))
            .map_err(|source| EngineError::Spawn { name, source })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop after one final export. Blocks until the thread exits.
    pub(crate) fn shutdown(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("metrics reporter panicked");
            }
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn report_loop(
    config: ReporterConfig,
    aggregator: &MetricsAggregator,
    mut exporters: Vec<Box<dyn MetricsExporter>>,
    stop: &StopSignal,
) {
    while !stop.wait_timeout(config.interval) {
        let snapshot = aggregator.snapshot_and_reset_interval();
        if !config.quiet {
            tracing::info!("{}", stats_line(&snapshot));
        }
        export(&mut exporters, &ExportBatch::from_snapshot(&snapshot, &config.identity));
    }

    if !exporters.is_empty() {
        let snapshot = aggregator.snapshot();
        export(&mut exporters, &ExportBatch::from_snapshot(&snapshot, &config.identity));
        for exporter in &mut exporters {
            if let Err(e) = exporter.flush() {
                tracing::warn!("Failed to flush {} exporter: {e}", exporter.name());
            }
        }
    }
}

fn export(exporters: &mut [Box<dyn MetricsExporter>], batch: &ExportBatch) {
    for exporter in exporters.iter_mut() {
        if let Err(e) = exporter.export(batch) {
            tracing::warn!("Failed to export metrics via {}: {e}", exporter.name());
        }
    }
}
