//! Metrics aggregation for kv-loadgen.
//!
//! Workers hand every [`OperationOutcome`](loadgen_core::OperationOutcome) to a
//! shared [`MetricsAggregator`] through the [`MetricsSink`] trait. The
//! aggregator keeps per-operation counters, a bounded latency ring and a fixed
//! bucket histogram under one coarse lock. Snapshots copy the raw data under
//! the lock and compute percentiles after releasing it.
//!
//! The reporting side turns snapshots into console tables ([`report`]) and
//! push batches for external telemetry ([`export`]).

pub mod aggregator;
pub mod export;
pub mod histogram;
pub mod report;
pub mod ring;
pub mod snapshot;

pub use aggregator::{ConnectionEvent, MetricsAggregator, MetricsSink};
pub use export::{ExportBatch, ExportError, HttpPushExporter, JsonLinesExporter, MetricsExporter};
pub use histogram::{HistogramSnapshot, LatencyHistogram};
pub use ring::LatencyRing;
pub use snapshot::{
    ChannelSnapshot, ConnectionSnapshot, MetricsSnapshot, OperationSnapshot, RunBounds,
    RunIdentity, RunSummary, RunTermination,
};
