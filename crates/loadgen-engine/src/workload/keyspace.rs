use loadgen_core::ValueSize;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Produces `{prefix}:{id}` keys.
///
/// With a key range of zero every key is new: ids come from a counter shared
/// by all workers of the run.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
    range: u64,
    sequence: Arc<AtomicU64>,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>, range: u64, sequence: Arc<AtomicU64>) -> Self {
        Self {
            prefix: prefix.into(),
            range,
            sequence,
        }
    }

    pub fn next_key<R: Rng>(&self, rng: &mut R) -> String {
        let id = if self.range > 0 {
            rng.random_range(0..self.range)
        } else {
            self.sequence.fetch_add(1, Ordering::Relaxed)
        };
        format!("{}:{id}", self.prefix)
    }
}

/// Random alphanumeric payloads.
#[derive(Debug, Clone, Copy)]
pub struct ValueGenerator {
    min: usize,
    max: usize,
}

impl ValueGenerator {
    pub fn new(size: ValueSize) -> Self {
        let (min, max) = size.bounds();
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn next_value<R: Rng>(&self, rng: &mut R) -> String {
        let len = if self.min == self.max {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        };
        (0..len)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_keys_stay_in_range() {
        let keys = KeyGenerator::new("k", 10, Arc::new(AtomicU64::new(0)));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let key = keys.next_key(&mut rng);
            let id: u64 = key.strip_prefix("k:").unwrap().parse().unwrap();
            assert!(id < 10);
        }
    }

    #[test]
    fn test_unbounded_keys_are_sequential_across_clones() {
        let sequence = Arc::new(AtomicU64::new(0));
        let a = KeyGenerator::new("seq", 0, Arc::clone(&sequence));
        let b = a.clone();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(a.next_key(&mut rng), "seq:0");
        assert_eq!(b.next_key(&mut rng), "seq:1");
        assert_eq!(a.next_key(&mut rng), "seq:2");
    }

    #[test]
    fn test_value_sizes() {
        let mut rng = StdRng::seed_from_u64(3);
        let fixed = ValueGenerator::new(ValueSize::Fixed(32));
        assert_eq!(fixed.next_value(&mut rng).len(), 32);

        let ranged = ValueGenerator::new(ValueSize::Range { min: 5, max: 9 });
        for _ in 0..200 {
            let v = ranged.next_value(&mut rng);
            assert!((5..=9).contains(&v.len()));
            assert!(v.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
