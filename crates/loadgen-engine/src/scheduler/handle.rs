use super::reporter::Reporter;
use super::stop::StopSignal;
use super::worker::WorkerExit;
use crate::pool::PoolHealth;
use chrono::{DateTime, Utc};
use loadgen_core::Connector;
use loadgen_metrics::{
    MetricsAggregator, MetricsSnapshot, RunBounds, RunIdentity, RunSummary, RunTermination,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the supervisor checks the duration and pool health.
const SUPERVISE_TICK: Duration = Duration::from_millis(100);

/// The parts of a pool the run needs after its connector type is erased.
pub(crate) trait PoolControl: Send + Sync {
    fn close(&self);
    fn all_closed(&self) -> bool;
    fn health(&self) -> PoolHealth;
}

impl<C: Connector> PoolControl for crate::pool::ConnectionPool<C> {
    fn close(&self) {
        crate::pool::ConnectionPool::close(self)
    }

    fn all_closed(&self) -> bool {
        crate::pool::ConnectionPool::all_closed(self)
    }

    fn health(&self) -> PoolHealth {
        crate::pool::ConnectionPool::health(self)
    }
}

pub(crate) struct RunParts {
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) aggregator: Arc<MetricsAggregator>,
    pub(crate) identity: RunIdentity,
    pub(crate) pools: Vec<Arc<dyn PoolControl>>,
    pub(crate) workers: Vec<JoinHandle<WorkerExit>>,
    pub(crate) live_workers: Arc<AtomicUsize>,
    pub(crate) reporter: Option<Reporter>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) started: Instant,
    pub(crate) duration: Option<Duration>,
    pub(crate) join_timeout: Duration,
}

struct Inner {
    stop: Arc<StopSignal>,
    aggregator: Arc<MetricsAggregator>,
    identity: RunIdentity,
    pools: Vec<Arc<dyn PoolControl>>,
    live_workers: Arc<AtomicUsize>,
    started_at: DateTime<Utc>,
    started: Instant,
    duration: Option<Duration>,
    join_timeout: Duration,
    threads: Mutex<Threads>,
    summary: Mutex<Option<RunSummary>>,
    finished: Condvar,
}

struct Threads {
    workers: Vec<JoinHandle<WorkerExit>>,
    reporter: Option<Reporter>,
}

/// Control handle of a running load test. Cheap to clone.
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<Inner>,
}

impl RunHandle {
    pub(crate) fn launch(parts: RunParts) -> Result<Self, crate::error::EngineError> {
        let inner = Arc::new(Inner {
            stop: parts.stop,
            aggregator: parts.aggregator,
            identity: parts.identity,
            pools: parts.pools,
            live_workers: parts.live_workers,
            started_at: parts.started_at,
            started: parts.started,
            duration: parts.duration,
            join_timeout: parts.join_timeout,
            threads: Mutex::new(Threads {
                workers: parts.workers,
                reporter: parts.reporter,
            }),
            summary: Mutex::new(None),
            finished: Condvar::new(),
        });

        let supervised = Arc::clone(&inner);
        let name = "run-supervisor".to_string();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || supervise(&supervised));
        if let Err(source) = spawned {
            inner.stop.stop();
            finish(&inner, RunTermination::Stopped);
            return Err(crate::error::EngineError::Spawn { name, source });
        }
        Ok(Self { inner })
    }

    /// Request a stop and wait for the shutdown to finish.
    ///
    /// Workers are joined up to the join timeout, then every pool is closed
    /// once. Returns the final summary; later calls return the same one.
    pub fn stop(&self) -> RunSummary {
        self.inner.stop.stop();
        self.await_completion()
    }

    /// Block until the run ends and return its summary.
    pub fn await_completion(&self) -> RunSummary {
        let mut summary = self.inner.summary.lock();
        loop {
            if let Some(summary) = summary.as_ref() {
                return summary.clone();
            }
            self.inner.finished.wait(&mut summary);
        }
    }

    /// Like [`await_completion`](Self::await_completion) with a bound.
    pub fn await_completion_timeout(&self, timeout: Duration) -> Option<RunSummary> {
        let deadline = Instant::now() + timeout;
        let mut summary = self.inner.summary.lock();
        loop {
            if let Some(summary) = summary.as_ref() {
                return Some(summary.clone());
            }
            if self.inner.finished.wait_until(&mut summary, deadline).timed_out() {
                return (*summary).clone();
            }
        }
    }

    pub fn current_snapshot(&self) -> MetricsSnapshot {
        self.inner.aggregator.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.summary.lock().is_some()
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stop.is_stopped()
    }

    /// Worker threads that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.inner.live_workers.load(Ordering::Acquire)
    }

    pub fn pool_health(&self) -> Vec<PoolHealth> {
        self.inner.pools.iter().map(|p| p.health()).collect()
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.inner.identity
    }
}

fn supervise(inner: &Inner) {
    let termination = loop {
        let tick = match inner.duration {
            Some(duration) => {
                let elapsed = inner.started.elapsed();
                if elapsed >= duration {
                    tracing::info!("Run duration of {duration:?} elapsed");
                    break RunTermination::Completed;
                }
                SUPERVISE_TICK.min(duration - elapsed)
            }
            None => SUPERVISE_TICK,
        };
        if inner.stop.wait_timeout(tick) {
            break RunTermination::Stopped;
        }
        if inner.pools.iter().all(|p| p.all_closed()) {
            tracing::error!(
                "Aborting run: every connection in every pool is closed after exhausting retries"
            );
            break RunTermination::Aborted;
        }
    };
    finish(inner, termination);
}

fn finish(inner: &Inner, termination: RunTermination) {
    inner.stop.stop();
    let stopped_at = Instant::now();
    let finished_at = Utc::now();

    let (workers, reporter) = {
        let mut threads = inner.threads.lock();
        (
            std::mem::take(&mut threads.workers),
            threads.reporter.take(),
        )
    };

    let deadline = stopped_at + inner.join_timeout;
    let mut detached = 0;
    for handle in workers {
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::error!("{name} panicked");
            }
        } else {
            detached += 1;
        }
    }
    if detached > 0 {
        tracing::warn!(
            "{detached} worker(s) did not exit within {:?}; detaching them",
            inner.join_timeout
        );
    }

    if let Some(mut reporter) = reporter {
        reporter.shutdown();
    }
    for pool in &inner.pools {
        pool.close();
    }

    let summary = inner.aggregator.final_summary(
        inner.identity.clone(),
        RunBounds {
            started_at: inner.started_at,
            finished_at,
            duration: stopped_at.duration_since(inner.started),
        },
        termination,
    );
    tracing::info!("{}", summary.summary());

    *inner.summary.lock() = Some(summary);
    inner.finished.notify_all();
}
