//! Turns a run plan into threads.
//!
//! For each of `client_instances` pools the engine spawns `threads_per_pool`
//! workers named `pool{p}-worker{t}`. A supervisor thread ends the run when
//! the duration elapses, when [`RunHandle::stop`] is called, or when every
//! connection of every pool has given up.

mod handle;
mod rate;
mod reporter;
mod stop;
mod worker;

pub use handle::RunHandle;
pub use rate::RateLimiter;
pub use stop::StopSignal;
pub use worker::{WorkerExit, POOL_ACQUIRE};

use crate::error::{EngineError, Result};
use crate::pool::ConnectionPool;
use crate::workload::{SharedWorkload, Workload};
use chrono::Utc;
use handle::{PoolControl, RunParts};
use loadgen_core::{ConnectionConfig, Connector, RunPlan, WorkloadSpec};
use loadgen_metrics::{MetricsAggregator, MetricsExporter, MetricsSink, RunIdentity};
use reporter::{Reporter, ReporterConfig};
use resp_client::RespConnector;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use worker::{LiveGuard, Worker};

/// Default period of the stats reporter.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Builder for one run.
pub struct Engine<C: Connector> {
    plan: RunPlan,
    connection: ConnectionConfig,
    workload: WorkloadSpec,
    connector: Arc<C>,
    aggregator: Arc<MetricsAggregator>,
    exporters: Vec<Box<dyn MetricsExporter>>,
    report_interval: Option<Duration>,
    quiet: bool,
    identity: RunIdentity,
    seed: Option<u64>,
}

impl<C: Connector> Engine<C> {
    pub fn new(
        plan: RunPlan,
        connection: ConnectionConfig,
        workload: WorkloadSpec,
        connector: C,
        aggregator: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            plan,
            connection,
            workload,
            connector: Arc::new(connector),
            aggregator,
            exporters: Vec::new(),
            report_interval: Some(DEFAULT_REPORT_INTERVAL),
            quiet: false,
            identity: RunIdentity::default(),
            seed: None,
        }
    }

    pub fn with_exporter(mut self, exporter: Box<dyn MetricsExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// `None` disables the periodic reporter.
    pub fn with_report_interval(mut self, interval: Option<Duration>) -> Self {
        self.report_interval = interval.filter(|i| !i.is_zero());
        self
    }

    /// Suppress the periodic stats line. Exporters still run.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Seed worker RNGs deterministically. Worker `n` gets `seed + n`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and spawn every thread of the run.
    pub fn start(self) -> Result<RunHandle> {
        self.connection.validate()?;
        self.plan.validate(self.connection.max_connections)?;
        let shared = SharedWorkload::new(&self.workload)?;

        tracing::info!(
            "Starting {} workload against {}: {} pool(s) x {} thread(s), {} connection(s) per pool, duration {}, target {}",
            self.workload.kind,
            self.connector.describe(),
            self.plan.client_instances,
            self.plan.threads_per_pool,
            self.plan.connections_per_pool,
            self.plan
                .duration
                .map(|d| format!("{:.0}s", d.as_secs_f64()))
                .unwrap_or_else(|| "unbounded".to_string()),
            self.plan
                .target_ops_per_second
                .map(|t| format!("{t} ops/sec"))
                .unwrap_or_else(|| "unlimited".to_string()),
        );

        let sink: Arc<dyn MetricsSink> = self.aggregator.clone();
        let stop = Arc::new(StopSignal::new());
        let live_workers = Arc::new(AtomicUsize::new(0));
        let started_at = Utc::now();
        let started = Instant::now();

        let pools: Vec<Arc<ConnectionPool<C>>> = (0..self.plan.client_instances)
            .map(|index| {
                Arc::new(ConnectionPool::new(
                    index,
                    self.plan.connections_per_pool,
                    Arc::clone(&self.connector),
                    &self.connection,
                    Arc::clone(&sink),
                    self.plan.acquire_timeout,
                ))
            })
            .collect();

        let mut workers: Vec<JoinHandle<WorkerExit>> =
            Vec::with_capacity(self.plan.total_workers());
        for pool in &pools {
            let limiter = self
                .plan
                .per_pool_target()
                .and_then(RateLimiter::new)
                .map(Arc::new);
            for thread_index in 0..self.plan.threads_per_pool {
                let name = format!("pool{}-worker{thread_index}", pool.index());
                let seed = self
                    .seed
                    .map(|s| s.wrapping_add(workers.len() as u64));
                let worker = Worker {
                    name: name.clone(),
                    pool: Arc::clone(pool),
                    workload: Workload::with_seed(
                        name.clone(),
                        &shared,
                        Arc::clone(&self.connector),
                        &self.connection,
                        Arc::clone(&sink),
                        seed,
                    ),
                    sink: Arc::clone(&sink),
                    limiter: limiter.clone(),
                    stop: Arc::clone(&stop),
                };
                let live = LiveGuard::new(&live_workers);
                let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                    let _live = live;
                    worker.run()
                });
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(source) => {
                        abort_start(&stop, workers, &pools);
                        return Err(EngineError::Spawn { name, source });
                    }
                }
            }
        }

        let reporter = match self.report_interval {
            Some(interval) => {
                let spawned = Reporter::spawn(
                    ReporterConfig {
                        interval,
                        quiet: self.quiet,
                        identity: self.identity.clone(),
                    },
                    Arc::clone(&self.aggregator),
                    self.exporters,
                );
                match spawned {
                    Ok(reporter) => Some(reporter),
                    Err(e) => {
                        abort_start(&stop, workers, &pools);
                        return Err(e);
                    }
                }
            }
            None => {
                if !self.exporters.is_empty() {
                    tracing::warn!("Metrics exporters configured without a report interval; they will not run");
                }
                None
            }
        };

        RunHandle::launch(RunParts {
            stop,
            aggregator: self.aggregator,
            identity: self.identity,
            pools: pools
                .into_iter()
                .map(|p| p as Arc<dyn PoolControl>)
                .collect(),
            workers,
            live_workers,
            reporter,
            started_at,
            started,
            duration: self.plan.duration,
            join_timeout: self.plan.join_timeout,
        })
    }
}

fn abort_start<C: Connector>(
    stop: &StopSignal,
    workers: Vec<JoinHandle<WorkerExit>>,
    pools: &[Arc<ConnectionPool<C>>],
) {
    stop.stop();
    for handle in workers {
        let _ = handle.join();
    }
    for pool in pools {
        pool.close();
    }
}

/// Start a run against a Redis-protocol server with a fresh aggregator.
pub fn start(plan: RunPlan, connection: ConnectionConfig, workload: WorkloadSpec) -> Result<RunHandle> {
    let connector = RespConnector::new(connection.clone())?;
    Engine::new(
        plan,
        connection,
        workload,
        connector,
        Arc::new(MetricsAggregator::new()),
    )
    .start()
}
