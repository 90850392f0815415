use super::stop::StopSignal;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Shared interval schedule for the workers of one pool.
///
/// Each call reserves the next free slot, so the pool as a whole approaches
/// the target rate however many workers share the limiter. After an idle
/// period at most one interval of backlog is made up.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next: Mutex<Instant>,
}

impl RateLimiter {
    /// `None` for a non-positive or non-finite rate.
    pub fn new(ops_per_second: f64) -> Option<Self> {
        if !ops_per_second.is_finite() || ops_per_second <= 0.0 {
            return None;
        }
        Some(Self {
            interval: Duration::from_secs_f64(1.0 / ops_per_second),
            next: Mutex::new(Instant::now()),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn reserve(&self) -> Instant {
        let mut next = self.next.lock();
        let now = Instant::now();
        let earliest = now.checked_sub(self.interval).unwrap_or(now);
        let slot = (*next).max(earliest);
        *next = slot + self.interval;
        slot
    }

    /// Wait for this caller's slot. Returns false if stopped while waiting.
    pub fn wait(&self, stop: &StopSignal) -> bool {
        let slot = self.reserve();
        if slot > Instant::now() {
            !stop.wait_until(slot)
        } else {
            !stop.is_stopped()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rejects_invalid_rates() {
        assert!(RateLimiter::new(0.0).is_none());
        assert!(RateLimiter::new(-5.0).is_none());
        assert!(RateLimiter::new(f64::INFINITY).is_none());
        assert_eq!(
            RateLimiter::new(100.0).unwrap().interval(),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_slots_are_spaced_by_interval() {
        let limiter = RateLimiter::new(100.0).unwrap();
        let a = limiter.reserve();
        let b = limiter.reserve();
        let c = limiter.reserve();
        assert_eq!(b - a, Duration::from_millis(10));
        assert_eq!(c - b, Duration::from_millis(10));
    }

    #[test]
    fn test_shared_rate_across_threads() {
        let limiter = Arc::new(RateLimiter::new(200.0).unwrap());
        let stop = Arc::new(StopSignal::new());
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    for _ in 0..25 {
                        assert!(limiter.wait(&stop));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // 100 slots at 5ms each: about half a second in total.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    }

    #[test]
    fn test_stop_interrupts_wait() {
        let limiter = RateLimiter::new(0.5).unwrap();
        let stop = StopSignal::new();
        assert!(limiter.wait(&stop));
        stop.stop();
        let start = Instant::now();
        assert!(!limiter.wait(&stop));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
