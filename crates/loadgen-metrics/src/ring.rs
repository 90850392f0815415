//! Fixed-capacity latency sample buffer.

use std::collections::VecDeque;
use std::time::Duration;

/// Default number of samples kept per operation.
pub const DEFAULT_RING_CAPACITY: usize = 10_000;

/// Bounded buffer of the most recent latency samples.
///
/// When full, the oldest sample is evicted. Percentiles computed from the ring
/// therefore describe the most recent `capacity` operations, not the whole
/// run. On long runs this biases percentiles towards recent behaviour; that is
/// the intended trade for bounded memory. Run-wide mean, min and max are kept
/// separately by the aggregator and are not affected.
#[derive(Debug, Clone)]
pub struct LatencyRing {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the current samples, oldest first.
    pub fn to_vec(&self) -> Vec<Duration> {
        self.samples.iter().copied().collect()
    }
}

impl Default for LatencyRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

/// Nearest-rank percentile of an ascending slice.
///
/// `rank = ceil(p / 100 * n)`, clamped to `[1, n]`. Returns zero for an empty
/// slice.
pub fn nearest_rank(sorted: &[Duration], percentile: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let n = sorted.len();
    let rank = ((percentile / 100.0) * n as f64).ceil() as usize;
    let rank = rank.clamp(1, n);
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = LatencyRing::new(3);
        for n in 1..=5 {
            ring.push(ms(n));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![ms(3), ms(4), ms(5)]);
    }

    #[test]
    fn test_nearest_rank() {
        let sorted: Vec<Duration> = (1..=100).map(ms).collect();
        assert_eq!(nearest_rank(&sorted, 50.0), ms(50));
        assert_eq!(nearest_rank(&sorted, 95.0), ms(95));
        assert_eq!(nearest_rank(&sorted, 99.0), ms(99));
        assert_eq!(nearest_rank(&sorted, 100.0), ms(100));
        assert_eq!(nearest_rank(&sorted, 0.0), ms(1));
    }

    #[test]
    fn test_nearest_rank_small_sets() {
        assert_eq!(nearest_rank(&[], 50.0), Duration::ZERO);
        assert_eq!(nearest_rank(&[ms(7)], 99.0), ms(7));
        // n = 4: p50 -> rank 2, p95 -> rank 4
        let sorted = [ms(1), ms(2), ms(3), ms(4)];
        assert_eq!(nearest_rank(&sorted, 50.0), ms(2));
        assert_eq!(nearest_rank(&sorted, 95.0), ms(4));
        // ties resolve to the tied value
        let ties = [ms(5), ms(5), ms(5), ms(9)];
        assert_eq!(nearest_rank(&ties, 75.0), ms(5));
    }
}
