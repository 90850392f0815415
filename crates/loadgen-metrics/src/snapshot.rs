//! Immutable views of aggregated metrics.

use crate::histogram::HistogramSnapshot;
use chrono::{DateTime, Utc};
use loadgen_core::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Labels identifying the run in reports and exported metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub app_name: String,
    pub service_name: String,
    pub instance_id: String,
    pub run_id: String,
    pub version: String,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self {
            app_name: "kv-loadgen".to_string(),
            service_name: "kv-loadgen".to_string(),
            instance_id: "local".to_string(),
            run_id: "local".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Point-in-time figures for one operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub total: u64,
    pub success: u64,
    pub errors: u64,
    /// Mean over the whole run, from the cumulative duration.
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Nearest-rank percentiles over the latency ring.
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    /// Number of samples the percentiles were computed from.
    pub samples: usize,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    /// Operations since the last interval reset.
    pub interval_total: u64,
    pub interval_errors: u64,
    pub histogram: HistogramSnapshot,
}

impl OperationSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            self.success as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Connection lifecycle counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub attempts: u64,
    pub failures: u64,
    pub drops: u64,
    pub reconnections: u64,
    pub avg_reconnection_ms: f64,
    pub max_reconnection_ms: f64,
    /// Managers that exhausted their retry attempts.
    pub hard_failures: u64,
    pub reconnection_histogram: HistogramSnapshot,
}

impl ConnectionSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.attempts > 0 {
            (self.attempts - self.failures) as f64 / self.attempts as f64
        } else {
            0.0
        }
    }
}

/// Pub/sub receipt counters for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub received: u64,
    pub errors: u64,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
}

/// Consistent copy of every counter at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Seconds since the aggregator was created.
    pub elapsed_secs: f64,
    /// Seconds since the last interval reset.
    pub interval_secs: f64,
    pub operations: BTreeMap<String, OperationSnapshot>,
    pub connections: ConnectionSnapshot,
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

impl MetricsSnapshot {
    pub fn total_operations(&self) -> u64 {
        self.operations.values().map(|o| o.total).sum()
    }

    pub fn successful_operations(&self) -> u64 {
        self.operations.values().map(|o| o.success).sum()
    }

    pub fn failed_operations(&self) -> u64 {
        self.operations.values().map(|o| o.errors).sum()
    }

    pub fn interval_operations(&self) -> u64 {
        self.operations.values().map(|o| o.interval_total).sum()
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_operations();
        if total > 0 {
            self.successful_operations() as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn ops_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.total_operations() as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn interval_ops_per_second(&self) -> f64 {
        if self.interval_secs > 0.0 {
            self.interval_operations() as f64 / self.interval_secs
        } else {
            0.0
        }
    }

    /// Error counts summed over every operation.
    pub fn errors_by_kind(&self) -> BTreeMap<ErrorKind, u64> {
        let mut out = BTreeMap::new();
        for op in self.operations.values() {
            for (kind, count) in &op.errors_by_kind {
                *out.entry(*kind).or_insert(0) += count;
            }
        }
        out
    }

    pub fn messages_received(&self) -> u64 {
        self.channels.values().map(|c| c.received).sum()
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTermination {
    /// The configured duration elapsed.
    Completed,
    /// Stopped by an external request.
    Stopped,
    /// Every connection in every pool was closed.
    Aborted,
}

impl fmt::Display for RunTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTermination::Completed => write!(f, "completed"),
            RunTermination::Stopped => write!(f, "stopped"),
            RunTermination::Aborted => write!(f, "aborted"),
        }
    }
}

/// Wall-clock bounds of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunBounds {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Final report of a run. Serializes to a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub identity: RunIdentity,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub termination: RunTermination,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub success_rate: f64,
    pub ops_per_second: f64,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    pub connection_attempts: u64,
    pub connection_failures: u64,
    pub connection_success_rate: f64,
    pub connection_drops: u64,
    pub reconnection_count: u64,
    pub avg_reconnection_ms: f64,
    pub max_reconnection_ms: f64,
    pub hard_connection_failures: u64,
    pub messages_received: u64,
    pub operations: BTreeMap<String, OperationSnapshot>,
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

impl RunSummary {
    pub fn from_snapshot(
        snapshot: MetricsSnapshot,
        identity: RunIdentity,
        bounds: RunBounds,
        termination: RunTermination,
    ) -> Self {
        let duration_secs = bounds.duration.as_secs_f64();
        let total_operations = snapshot.total_operations();
        let ops_per_second = if duration_secs > 0.0 {
            total_operations as f64 / duration_secs
        } else {
            0.0
        };
        let conn = &snapshot.connections;
        Self {
            identity,
            started_at: bounds.started_at,
            finished_at: bounds.finished_at,
            duration_secs,
            termination,
            total_operations,
            successful_operations: snapshot.successful_operations(),
            failed_operations: snapshot.failed_operations(),
            success_rate: snapshot.success_rate(),
            ops_per_second,
            errors_by_kind: snapshot.errors_by_kind(),
            connection_attempts: conn.attempts,
            connection_failures: conn.failures,
            connection_success_rate: conn.success_rate(),
            connection_drops: conn.drops,
            reconnection_count: conn.reconnections,
            avg_reconnection_ms: conn.avg_reconnection_ms,
            max_reconnection_ms: conn.max_reconnection_ms,
            hard_connection_failures: conn.hard_failures,
            messages_received: snapshot.messages_received(),
            operations: snapshot.operations,
            channels: snapshot.channels,
        }
    }

    /// One-paragraph text summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "Run {} ({}) after {:.1}s\n\
             Operations: {} total, {} ok, {} failed ({:.2}% success), {:.1} ops/sec\n\
             Connections: {} attempts, {} failures, {} drops, {} reconnections, {} closed",
            self.identity.run_id,
            self.termination,
            self.duration_secs,
            self.total_operations,
            self.successful_operations,
            self.failed_operations,
            self.success_rate * 100.0,
            self.ops_per_second,
            self.connection_attempts,
            self.connection_failures,
            self.connection_drops,
            self.reconnection_count,
            self.hard_connection_failures,
        )
    }
}
