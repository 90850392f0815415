use std::time::Duration;

/// Exponential reconnect delay.
///
/// The n-th consecutive failure waits `min(base * multiplier^(n-1), max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier: multiplier.max(1.0),
            max: max.max(base),
            failures: 0,
        }
    }

    /// Register a failure and return the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current()
    }

    /// Delay for the failures registered so far. Base when there are none.
    pub fn current(&self) -> Duration {
        let exponent = self.failures.saturating_sub(1).min(64) as i32;
        let nanos = self.base.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max.as_nanos() as f64 {
            self.max
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
