//! Workload variants: how one unit of work is selected and executed.
//!
//! Every worker owns its own [`Workload`] (and RNG). The normalized
//! [`OperationMix`] and the key sequence are built once per run in
//! [`SharedWorkload`] and shared read-only between workers.

mod commands;
mod keyspace;
mod mix;
mod pubsub;

pub use commands::CommandFactory;
pub use keyspace::{KeyGenerator, ValueGenerator};
pub use mix::OperationMix;
pub use pubsub::{Listener, LISTENER_JOIN_TIMEOUT};

use crate::connection::ConnectionManager;
use crate::error::ExecError;
use loadgen_core::{
    ConfigError, ConnectionConfig, Connector, ErrorKind, KvClient, OpKind, OperationOutcome,
    WorkloadKind, WorkloadSpec,
};
use loadgen_metrics::MetricsSink;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-run state shared by every worker's workload.
#[derive(Debug, Clone)]
pub struct SharedWorkload {
    spec: WorkloadSpec,
    mix: Arc<OperationMix>,
    sequence: Arc<AtomicU64>,
    channels: Arc<[String]>,
}

impl SharedWorkload {
    pub fn new(spec: &WorkloadSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        let mix = OperationMix::new(&spec.weighted_operations())?;
        Ok(Self {
            spec: spec.clone(),
            mix: Arc::new(mix),
            sequence: Arc::new(AtomicU64::new(0)),
            channels: spec.channels.iter().cloned().collect(),
        })
    }

    pub fn spec(&self) -> &WorkloadSpec {
        &self.spec
    }

    pub fn mix(&self) -> &Arc<OperationMix> {
        &self.mix
    }

    fn command_factory(&self) -> CommandFactory {
        CommandFactory::new(
            KeyGenerator::new(
                self.spec.key_prefix.clone(),
                self.spec.key_range,
                Arc::clone(&self.sequence),
            ),
            ValueGenerator::new(self.spec.value_size),
            Arc::clone(&self.channels),
        )
    }
}

/// Selection state owned by one worker.
#[derive(Debug)]
pub struct Selector {
    mix: Arc<OperationMix>,
    commands: CommandFactory,
    rng: StdRng,
}

impl Selector {
    fn new(shared: &SharedWorkload, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            mix: Arc::clone(&shared.mix),
            commands: shared.command_factory(),
            rng,
        }
    }

    pub fn select(&mut self) -> OpKind {
        self.mix.select(&mut self.rng)
    }

    fn execute_single<C: Connector>(
        &mut self,
        op: OpKind,
        conn: &mut ConnectionManager<C>,
    ) -> OperationOutcome {
        let Some(command) = self.commands.build(op, &mut self.rng) else {
            return OperationOutcome::failure(op.name(), Duration::ZERO, ErrorKind::Command);
        };
        let start = Instant::now();
        let result = conn.execute(|client| client.execute(&command));
        let latency = start.elapsed();
        OperationOutcome::from_result(op.name(), latency, &result.map_err(|e| e.kind()))
    }

    fn build_batch(&mut self, size: usize) -> (Vec<OpKind>, Vec<loadgen_core::Command>) {
        let mut ops = Vec::with_capacity(size);
        let mut commands = Vec::with_capacity(size);
        for _ in 0..size {
            let op = self.select();
            if let Some(command) = self.commands.build(op, &mut self.rng) {
                ops.push(op);
                commands.push(command);
            }
        }
        (ops, commands)
    }
}

/// Pub/sub specific state: the lazily started listener.
pub struct PubSubState<C: Connector> {
    name: String,
    connector: Arc<C>,
    config: ConnectionConfig,
    sink: Arc<dyn MetricsSink>,
    channels: Vec<String>,
    listener: Option<Listener>,
}

impl<C: Connector> PubSubState<C> {
    /// Start the listener unless one is already running.
    fn ensure_listening(&mut self) -> Result<(), ErrorKind> {
        if self.listener.as_ref().is_some_and(Listener::is_running) {
            return Ok(());
        }
        if let Some(mut stale) = self.listener.take() {
            stale.stop(Duration::ZERO);
        }
        let listener = Listener::spawn(
            format!("{}-listener", self.name),
            Arc::clone(&self.connector),
            self.channels.clone(),
            &self.config,
            Arc::clone(&self.sink),
        )
        .map_err(|e| {
            tracing::error!("{}: failed to start listener thread: {e}", self.name);
            ErrorKind::Unknown
        })?;
        self.listener = Some(listener);
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_running)
    }
}

/// One worker's workload.
pub enum Workload<C: Connector> {
    /// One command per unit of work.
    Single(Selector),
    /// `size` commands in one round trip. Each command succeeds or fails on
    /// its own.
    Pipelined { selector: Selector, size: usize },
    /// `size` commands in MULTI/EXEC. All succeed or all fail.
    Transactional { selector: Selector, size: usize },
    /// PUBLISH metered like any command; SUBSCRIBE starts a listener.
    PubSub {
        selector: Selector,
        state: PubSubState<C>,
    },
}

impl<C: Connector> Workload<C> {
    /// Build the workload for one worker. `name` labels the worker's
    /// threads and log lines.
    pub fn new(
        name: impl Into<String>,
        shared: &SharedWorkload,
        connector: Arc<C>,
        config: &ConnectionConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self::with_seed(name, shared, connector, config, sink, None)
    }

    pub fn with_seed(
        name: impl Into<String>,
        shared: &SharedWorkload,
        connector: Arc<C>,
        config: &ConnectionConfig,
        sink: Arc<dyn MetricsSink>,
        seed: Option<u64>,
    ) -> Self {
        let selector = Selector::new(shared, seed);
        let spec = shared.spec();
        match spec.kind {
            WorkloadKind::Single => Workload::Single(selector),
            WorkloadKind::Pipelined => Workload::Pipelined {
                selector,
                size: spec.pipeline_size,
            },
            WorkloadKind::Transactional => Workload::Transactional {
                selector,
                size: spec.transaction_size,
            },
            WorkloadKind::PubSub => Workload::PubSub {
                selector,
                state: PubSubState {
                    name: name.into(),
                    connector,
                    config: config.clone(),
                    sink,
                    channels: spec.channels.clone(),
                    listener: None,
                },
            },
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Single(_) => WorkloadKind::Single,
            Workload::Pipelined { .. } => WorkloadKind::Pipelined,
            Workload::Transactional { .. } => WorkloadKind::Transactional,
            Workload::PubSub { .. } => WorkloadKind::PubSub,
        }
    }

    pub fn select_operation(&mut self) -> OpKind {
        self.selector_mut().select()
    }

    /// Execute one unit of work on `conn`.
    ///
    /// Never fails: every error becomes a failed outcome. Returns one outcome
    /// per attempted operation.
    pub fn execute_once(&mut self, conn: &mut ConnectionManager<C>) -> Vec<OperationOutcome> {
        match self {
            Workload::Single(selector) => {
                let op = selector.select();
                vec![selector.execute_single(op, conn)]
            }
            Workload::Pipelined { selector, size } => {
                let (ops, commands) = selector.build_batch(*size);
                if commands.is_empty() {
                    return Vec::new();
                }
                let start = Instant::now();
                let result = conn.execute(|client| client.pipeline(&commands));
                let latency = average(start.elapsed(), ops.len());
                match result {
                    Ok(replies) => {
                        let mut replies = replies.into_iter();
                        ops.iter()
                            .map(|op| match replies.next() {
                                Some(Ok(_)) => OperationOutcome::success(op.name(), latency),
                                Some(Err(e)) => {
                                    OperationOutcome::failure(op.name(), latency, e.kind())
                                }
                                None => OperationOutcome::failure(
                                    op.name(),
                                    latency,
                                    ErrorKind::Unknown,
                                ),
                            })
                            .collect()
                    }
                    Err(e) => fail_all(&ops, latency, &e),
                }
            }
            Workload::Transactional { selector, size } => {
                let (ops, commands) = selector.build_batch(*size);
                if commands.is_empty() {
                    return Vec::new();
                }
                let start = Instant::now();
                let result = conn.execute(|client| client.transaction(&commands));
                let latency = average(start.elapsed(), ops.len());
                match result {
                    Ok(_) => ops
                        .iter()
                        .map(|op| OperationOutcome::success(op.name(), latency))
                        .collect(),
                    Err(e) => fail_all(&ops, latency, &e),
                }
            }
            Workload::PubSub { selector, state } => {
                let op = selector.select();
                if op == OpKind::Subscribe {
                    let start = Instant::now();
                    let result = state.ensure_listening();
                    vec![OperationOutcome::from_result(
                        op.name(),
                        start.elapsed(),
                        &result,
                    )]
                } else {
                    vec![selector.execute_single(op, conn)]
                }
            }
        }
    }

    /// Release background resources. Idempotent; also runs on drop.
    pub fn cleanup(&mut self) {
        if let Workload::PubSub { state, .. } = self {
            if let Some(mut listener) = state.listener.take() {
                listener.stop(LISTENER_JOIN_TIMEOUT);
            }
        }
    }

    pub fn is_listening(&self) -> bool {
        match self {
            Workload::PubSub { state, .. } => state.is_listening(),
            _ => false,
        }
    }

    fn selector_mut(&mut self) -> &mut Selector {
        match self {
            Workload::Single(selector)
            | Workload::Pipelined { selector, .. }
            | Workload::Transactional { selector, .. }
            | Workload::PubSub { selector, .. } => selector,
        }
    }
}

impl<C: Connector> Drop for Workload<C> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn average(total: Duration, count: usize) -> Duration {
    if count == 0 {
        total
    } else {
        total / count as u32
    }
}

fn fail_all(ops: &[OpKind], latency: Duration, error: &ExecError) -> Vec<OperationOutcome> {
    let kind = error.kind();
    ops.iter()
        .map(|op| OperationOutcome::failure(op.name(), latency, kind))
        .collect()
}
