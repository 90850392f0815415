//! Fixed-bucket duration histogram for export.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bounds in milliseconds. A final overflow bucket catches the rest.
pub const DEFAULT_BOUNDS_MS: [f64; 15] = [
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
    10000.0,
];

/// Per-bucket counts: each bucket holds samples in `(prev, bound]`.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    counts: [u64; DEFAULT_BOUNDS_MS.len() + 1],
    sum_ms: f64,
    count: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            counts: [0; DEFAULT_BOUNDS_MS.len() + 1],
            sum_ms: 0.0,
            count: 0,
        }
    }
}

impl LatencyHistogram {
    pub fn observe(&mut self, sample: Duration) {
        let ms = sample.as_secs_f64() * 1000.0;
        let index = DEFAULT_BOUNDS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(DEFAULT_BOUNDS_MS.len());
        self.counts[index] += 1;
        self.sum_ms += ms;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds_ms: DEFAULT_BOUNDS_MS.to_vec(),
            counts: self.counts.to_vec(),
            sum_ms: self.sum_ms,
            count: self.count,
        }
    }
}

/// Exported form of a histogram. `counts` has one more entry than
/// `bounds_ms`; the last one is the overflow bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub bounds_ms: Vec<f64>,
    pub counts: Vec<u64>,
    pub sum_ms: f64,
    pub count: u64,
}

impl HistogramSnapshot {
    /// Running totals per bucket, as expected by Prometheus-style backends.
    pub fn cumulative(&self) -> Vec<u64> {
        self.counts
            .iter()
            .scan(0u64, |acc, c| {
                *acc += c;
                Some(*acc)
            })
            .collect()
    }
}
