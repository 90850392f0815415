use super::rate::RateLimiter;
use super::stop::StopSignal;
use crate::connection::ConnectionState;
use crate::error::PoolError;
use crate::pool::ConnectionPool;
use crate::workload::Workload;
use loadgen_core::{Connector, ErrorKind, OperationOutcome};
use loadgen_metrics::MetricsSink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Metrics label for acquire timeouts.
pub const POOL_ACQUIRE: &str = "POOL_ACQUIRE";

/// Upper bound on the pause after hitting a connection that is not ready.
const NOT_READY_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Stopped,
    PoolClosed,
    AllConnectionsClosed,
}

/// Counts live worker threads. Decrements when dropped.
pub(crate) struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    pub(crate) fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct Worker<C: Connector> {
    pub(crate) name: String,
    pub(crate) pool: Arc<ConnectionPool<C>>,
    pub(crate) workload: Workload<C>,
    pub(crate) sink: Arc<dyn MetricsSink>,
    pub(crate) limiter: Option<Arc<RateLimiter>>,
    pub(crate) stop: Arc<StopSignal>,
}

impl<C: Connector> Worker<C> {
    /// Loop until stopped or the pool can no longer serve.
    ///
    /// The stop signal is only checked between units of work, so an
    /// operation in flight always completes or fails on its own timeout.
    pub(crate) fn run(mut self) -> WorkerExit {
        tracing::debug!("{} started", self.name);
        let exit = loop {
            if self.stop.is_stopped() {
                break WorkerExit::Stopped;
            }

            let mut conn = match self.pool.acquire() {
                Ok(conn) => conn,
                Err(PoolError::Exhausted(waited)) => {
                    self.sink.record(OperationOutcome::failure(
                        POOL_ACQUIRE,
                        waited,
                        ErrorKind::Connection,
                    ));
                    continue;
                }
                Err(PoolError::Closed) => break WorkerExit::PoolClosed,
                Err(PoolError::AllConnectionsClosed) => {
                    tracing::warn!("{}: every connection in its pool is closed", self.name);
                    break WorkerExit::AllConnectionsClosed;
                }
            };

            let outcomes = self.workload.execute_once(&mut conn);
            let pause = match conn.state() {
                ConnectionState::Connected | ConnectionState::Closed => None,
                _ => Some(conn.retry_in().min(NOT_READY_PAUSE)),
            };
            for outcome in outcomes {
                self.sink.record(outcome);
            }
            self.pool.release(conn);

            if let Some(pause) = pause {
                if self.stop.wait_timeout(pause) {
                    break WorkerExit::Stopped;
                }
                continue;
            }

            if let Some(limiter) = &self.limiter {
                if !limiter.wait(&self.stop) {
                    break WorkerExit::Stopped;
                }
            }
        };
        self.workload.cleanup();
        tracing::debug!("{} exited: {exit:?}", self.name);
        exit
    }
}
