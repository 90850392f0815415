//! One resilient logical connection.
//!
//! A [`ConnectionManager`] owns at most one live client and drives it through
//! [`ConnectionState`]. Reconnects happen lazily: the worker holding the
//! manager calls [`ConnectionManager::execute`], which attempts a connect when
//! the backoff has elapsed and fails fast with [`ExecError::NotReady`] when it
//! has not. Nothing here sleeps.

mod backoff;
mod state;

pub use backoff::Backoff;
pub use state::{ConnectionState, StateCell};

use crate::error::ExecError;
use loadgen_core::{ClientError, ConnectionConfig, Connector, KvClient};
use loadgen_metrics::{ConnectionEvent, MetricsSink};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Position of a manager: pool index and slot within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId {
    pub pool: usize,
    pub index: usize,
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool{}-conn{}", self.pool, self.index)
    }
}

pub struct ConnectionManager<C: Connector> {
    id: ManagerId,
    connector: Arc<C>,
    node: usize,
    client: Option<C::Client>,
    state: Arc<StateCell>,
    backoff: Backoff,
    retry_attempts: u32,
    next_attempt_at: Option<Instant>,
    outage_started: Option<Instant>,
    last_used: Instant,
    health_check_interval: Duration,
    sink: Arc<dyn MetricsSink>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        id: ManagerId,
        connector: Arc<C>,
        node: usize,
        config: &ConnectionConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            id,
            connector,
            node,
            client: None,
            state: Arc::new(StateCell::new(ConnectionState::Disconnected)),
            backoff: Backoff::new(
                config.backoff_base,
                config.backoff_multiplier,
                config.backoff_max,
            ),
            retry_attempts: config.retry_attempts,
            next_attempt_at: None,
            outage_started: None,
            last_used: Instant::now(),
            health_check_interval: config.health_check_interval,
            sink,
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Shared handle to the state, readable without this manager's lock.
    pub fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Time until the next connect attempt is allowed.
    pub fn retry_in(&self) -> Duration {
        self.next_attempt_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Make the manager usable if possible.
    ///
    /// Connects when disconnected or degraded and the backoff has elapsed, and
    /// pings an idle connection once the health check interval has passed.
    /// A zero interval disables the health check.
    pub fn prepare(&mut self) -> Result<(), ExecError> {
        match self.state() {
            ConnectionState::Closed => Err(ExecError::Closed),
            ConnectionState::Connected => {
                if !self.health_check_interval.is_zero()
                    && self.last_used.elapsed() >= self.health_check_interval
                {
                    self.health_check()
                } else {
                    Ok(())
                }
            }
            state @ (ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Degraded) => {
                if let Some(at) = self.next_attempt_at {
                    let now = Instant::now();
                    if now < at {
                        return Err(ExecError::NotReady {
                            state,
                            retry_in: at - now,
                        });
                    }
                }
                self.connect()
            }
        }
    }

    /// Run `op` against the live client.
    ///
    /// Transport failures degrade the connection. Server error replies leave
    /// it connected.
    pub fn execute<T, F>(&mut self, op: F) -> Result<T, ExecError>
    where
        F: FnOnce(&mut C::Client) -> Result<T, ClientError>,
    {
        self.prepare()?;
        let Some(client) = self.client.as_mut() else {
            return Err(ExecError::NotReady {
                state: self.state.get(),
                retry_in: self.retry_in(),
            });
        };
        let result = op(client);
        match result {
            Ok(value) => {
                self.last_used = Instant::now();
                Ok(value)
            }
            Err(e) => {
                if e.is_transport() {
                    self.drop_connection(&e);
                } else {
                    self.last_used = Instant::now();
                }
                Err(ExecError::Client(e))
            }
        }
    }

    /// Shut down. Idempotent; not counted as a connection failure.
    pub fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close();
        }
        if self.state() != ConnectionState::Closed {
            tracing::debug!("{} closed", self.id);
            self.state.set(ConnectionState::Closed);
        }
    }

    fn health_check(&mut self) -> Result<(), ExecError> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };
        match client.ping() {
            Ok(()) => {
                self.last_used = Instant::now();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} failed health check: {e}", self.id);
                self.drop_connection(&e);
                Err(ExecError::Client(e))
            }
        }
    }

    fn connect(&mut self) -> Result<(), ExecError> {
        self.state.set(ConnectionState::Connecting);
        let result = self.connector.connect(self.node).and_then(|mut client| {
            match client.ping() {
                Ok(()) => Ok(client),
                Err(e) => {
                    client.close();
                    Err(e)
                }
            }
        });

        match result {
            Ok(client) => {
                self.sink
                    .record_connection(ConnectionEvent::Attempt { success: true });
                if let Some(started) = self.outage_started.take() {
                    let duration = started.elapsed();
                    tracing::info!(
                        "{} reconnected after {:.1}ms ({} failed attempts)",
                        self.id,
                        duration.as_secs_f64() * 1000.0,
                        self.backoff.failures()
                    );
                    self.sink
                        .record_connection(ConnectionEvent::Reconnected { duration });
                } else {
                    tracing::debug!("{} connected to node {}", self.id, self.node);
                }
                self.backoff.reset();
                self.next_attempt_at = None;
                self.client = Some(client);
                self.last_used = Instant::now();
                self.state.set(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.sink
                    .record_connection(ConnectionEvent::Attempt { success: false });
                self.start_outage();
                let delay = self.backoff.next_delay();
                if self.backoff.failures() > self.retry_attempts {
                    tracing::error!(
                        "{} giving up after {} consecutive failed connection attempts: {e}",
                        self.id,
                        self.backoff.failures()
                    );
                    self.next_attempt_at = None;
                    self.state.set(ConnectionState::Closed);
                    self.sink.record_connection(ConnectionEvent::Closed);
                } else {
                    tracing::warn!(
                        "{} connection attempt {} failed: {e}. Retrying in {delay:?}",
                        self.id,
                        self.backoff.failures()
                    );
                    self.next_attempt_at = Some(Instant::now() + delay);
                    self.state.set(ConnectionState::Degraded);
                    self.sink.record_connection(ConnectionEvent::Dropped);
                }
                Err(ExecError::Client(e))
            }
        }
    }

    /// Connected -> Degraded after a broken connection.
    fn drop_connection(&mut self, error: &ClientError) {
        tracing::warn!("{} lost connection: {error}", self.id);
        if let Some(mut client) = self.client.take() {
            client.close();
        }
        self.start_outage();
        self.next_attempt_at = Some(Instant::now() + self.backoff.current());
        self.state.set(ConnectionState::Degraded);
        self.sink.record_connection(ConnectionEvent::Dropped);
    }

    fn start_outage(&mut self) {
        if self.outage_started.is_none() {
            self.outage_started = Some(Instant::now());
            self.sink.record_connection(ConnectionEvent::OutageStarted);
        }
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close();
        }
    }
}
