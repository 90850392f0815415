//! The shared, thread-safe metrics sink.

use crate::histogram::LatencyHistogram;
use crate::ring::{nearest_rank, LatencyRing, DEFAULT_RING_CAPACITY};
use crate::snapshot::{
    ChannelSnapshot, ConnectionSnapshot, MetricsSnapshot, OperationSnapshot, RunBounds,
    RunIdentity, RunSummary, RunTermination,
};
use chrono::Utc;
use loadgen_core::{ErrorKind, OperationOutcome};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Connection lifecycle events reported by connection managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One connect attempt finished.
    Attempt { success: bool },
    /// An established connection broke.
    Dropped,
    /// A manager lost (or never had) a connection and started retrying.
    OutageStarted,
    /// A retry succeeded after an outage that lasted `duration`.
    Reconnected { duration: Duration },
    /// A manager gave up after exhausting its retry attempts.
    Closed,
}

/// Destination for everything workers and managers observe.
///
/// Implementations must accept concurrent calls from any number of threads.
pub trait MetricsSink: Send + Sync {
    fn record(&self, outcome: OperationOutcome);

    fn record_connection(&self, event: ConnectionEvent);

    /// A pub/sub message arrived, or receiving on the channel failed.
    fn record_message(&self, channel: &str, result: Result<(), ErrorKind>);
}

#[derive(Debug, Clone)]
struct OperationMetrics {
    total: u64,
    success: u64,
    errors: u64,
    total_duration: Duration,
    min: Option<Duration>,
    max: Duration,
    latencies: LatencyRing,
    errors_by_kind: BTreeMap<ErrorKind, u64>,
    histogram: LatencyHistogram,
    interval_total: u64,
    interval_errors: u64,
}

impl OperationMetrics {
    fn new(ring_capacity: usize) -> Self {
        Self {
            total: 0,
            success: 0,
            errors: 0,
            total_duration: Duration::ZERO,
            min: None,
            max: Duration::ZERO,
            latencies: LatencyRing::new(ring_capacity),
            errors_by_kind: BTreeMap::new(),
            histogram: LatencyHistogram::default(),
            interval_total: 0,
            interval_errors: 0,
        }
    }

    fn record(&mut self, outcome: &OperationOutcome) {
        self.total += 1;
        self.interval_total += 1;
        if outcome.success {
            self.success += 1;
        } else {
            self.errors += 1;
            self.interval_errors += 1;
            let kind = outcome.error.unwrap_or(ErrorKind::Unknown);
            *self.errors_by_kind.entry(kind).or_insert(0) += 1;
        }
        self.total_duration += outcome.latency;
        self.min = Some(self.min.map_or(outcome.latency, |m| m.min(outcome.latency)));
        self.max = self.max.max(outcome.latency);
        self.latencies.push(outcome.latency);
        self.histogram.observe(outcome.latency);
    }
}

#[derive(Debug, Default)]
struct ConnectionMetrics {
    attempts: u64,
    failures: u64,
    drops: u64,
    reconnections: u64,
    reconnected: u64,
    reconnection_total: Duration,
    reconnection_max: Duration,
    reconnection_histogram: LatencyHistogram,
    hard_failures: u64,
}

#[derive(Debug, Default)]
struct ChannelMetrics {
    received: u64,
    errors: u64,
    errors_by_kind: BTreeMap<ErrorKind, u64>,
}

struct State {
    operations: HashMap<&'static str, OperationMetrics>,
    connections: ConnectionMetrics,
    channels: HashMap<String, ChannelMetrics>,
    interval_started: Instant,
}

impl State {
    fn reset_interval(&mut self, now: Instant) {
        for metrics in self.operations.values_mut() {
            metrics.interval_total = 0;
            metrics.interval_errors = 0;
        }
        self.interval_started = now;
    }
}

/// Copy of one operation's raw data, taken under the lock.
struct RawOperation {
    name: &'static str,
    metrics: OperationMetrics,
}

/// Aggregates outcomes from every worker of a run.
///
/// One coarse lock guards all state. Each critical section is a handful of
/// counter updates plus one ring push; percentile sorting happens outside the
/// lock on a copy.
pub struct MetricsAggregator {
    state: Mutex<State>,
    ring_capacity: usize,
    created: Instant,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::with_ring_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_ring_capacity(ring_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(State {
                operations: HashMap::new(),
                connections: ConnectionMetrics::default(),
                channels: HashMap::new(),
                interval_started: now,
            }),
            ring_capacity,
            created: now,
        }
    }

    /// Start a new reporting window. Run totals are kept.
    pub fn reset_interval(&self) {
        self.state.lock().reset_interval(Instant::now());
    }

    /// Consistent copy of all counters with percentiles computed.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.capture(false)
    }

    /// Snapshot and start a new reporting window under one lock, so no
    /// outcome falls between the copy and the reset.
    pub fn snapshot_and_reset_interval(&self) -> MetricsSnapshot {
        self.capture(true)
    }

    fn capture(&self, reset: bool) -> MetricsSnapshot {
        let taken = Instant::now();
        let (raw, connections, channels, interval_started) = {
            let mut state = self.state.lock();
            let raw: Vec<RawOperation> = state
                .operations
                .iter()
                .map(|(name, metrics)| RawOperation {
                    name: *name,
                    metrics: metrics.clone(),
                })
                .collect();
            let connections = connection_snapshot(&state.connections);
            let channels: BTreeMap<String, ChannelSnapshot> = state
                .channels
                .iter()
                .map(|(name, c)| {
                    (
                        name.clone(),
                        ChannelSnapshot {
                            received: c.received,
                            errors: c.errors,
                            errors_by_kind: c.errors_by_kind.clone(),
                        },
                    )
                })
                .collect();
            let interval_started = state.interval_started;
            if reset {
                state.reset_interval(taken);
            }
            (raw, connections, channels, interval_started)
        };

        let operations = raw
            .into_iter()
            .map(|r| (r.name.to_string(), operation_snapshot(&r.metrics)))
            .collect();

        MetricsSnapshot {
            taken_at: Utc::now(),
            elapsed_secs: taken.duration_since(self.created).as_secs_f64(),
            interval_secs: taken.saturating_duration_since(interval_started).as_secs_f64(),
            operations,
            connections,
            channels,
        }
    }

    /// Snapshot plus run bounds and identity.
    pub fn final_summary(
        &self,
        identity: RunIdentity,
        bounds: RunBounds,
        termination: RunTermination,
    ) -> RunSummary {
        RunSummary::from_snapshot(self.snapshot(), identity, bounds, termination)
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn operation_snapshot(metrics: &OperationMetrics) -> OperationSnapshot {
    let mut sorted = metrics.latencies.to_vec();
    sorted.sort_unstable();
    let avg_ms = if metrics.total > 0 {
        ms(metrics.total_duration) / metrics.total as f64
    } else {
        0.0
    };
    OperationSnapshot {
        total: metrics.total,
        success: metrics.success,
        errors: metrics.errors,
        avg_ms,
        min_ms: metrics.min.map(ms).unwrap_or(0.0),
        max_ms: ms(metrics.max),
        p50_ms: ms(nearest_rank(&sorted, 50.0)),
        p95_ms: ms(nearest_rank(&sorted, 95.0)),
        p99_ms: ms(nearest_rank(&sorted, 99.0)),
        samples: sorted.len(),
        errors_by_kind: metrics.errors_by_kind.clone(),
        interval_total: metrics.interval_total,
        interval_errors: metrics.interval_errors,
        histogram: metrics.histogram.snapshot(),
    }
}

fn connection_snapshot(c: &ConnectionMetrics) -> ConnectionSnapshot {
    let avg_reconnection_ms = if c.reconnected > 0 {
        ms(c.reconnection_total) / c.reconnected as f64
    } else {
        0.0
    };
    ConnectionSnapshot {
        attempts: c.attempts,
        failures: c.failures,
        drops: c.drops,
        reconnections: c.reconnections,
        avg_reconnection_ms,
        max_reconnection_ms: ms(c.reconnection_max),
        hard_failures: c.hard_failures,
        reconnection_histogram: c.reconnection_histogram.snapshot(),
    }
}

impl MetricsSink for MetricsAggregator {
    fn record(&self, outcome: OperationOutcome) {
        let mut state = self.state.lock();
        let ring_capacity = self.ring_capacity;
        state
            .operations
            .entry(outcome.operation)
            .or_insert_with(|| OperationMetrics::new(ring_capacity))
            .record(&outcome);
    }

    fn record_connection(&self, event: ConnectionEvent) {
        let mut state = self.state.lock();
        let c = &mut state.connections;
        match event {
            ConnectionEvent::Attempt { success } => {
                c.attempts += 1;
                if !success {
                    c.failures += 1;
                }
            }
            ConnectionEvent::Dropped => c.drops += 1,
            ConnectionEvent::OutageStarted => c.reconnections += 1,
            ConnectionEvent::Reconnected { duration } => {
                c.reconnected += 1;
                c.reconnection_total += duration;
                c.reconnection_max = c.reconnection_max.max(duration);
                c.reconnection_histogram.observe(duration);
            }
            ConnectionEvent::Closed => c.hard_failures += 1,
        }
    }

    fn record_message(&self, channel: &str, result: Result<(), ErrorKind>) {
        let mut state = self.state.lock();
        if !state.channels.contains_key(channel) {
            state
                .channels
                .insert(channel.to_string(), ChannelMetrics::default());
        }
        if let Some(metrics) = state.channels.get_mut(channel) {
            match result {
                Ok(()) => metrics.received += 1,
                Err(kind) => {
                    metrics.errors += 1;
                    *metrics.errors_by_kind.entry(kind).or_insert(0) += 1;
                }
            }
        }
    }
}
