use loadgen_core::{ConfigError, OpKind};
use rand::Rng;

/// Normalized cumulative weights over the candidate operations.
///
/// Built once per run and shared read-only by every worker. Selection takes
/// the caller's RNG, so concurrent workers never touch shared mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMix {
    operations: Vec<OpKind>,
    cumulative: Vec<f64>,
}

impl OperationMix {
    /// Operations with zero weight are dropped.
    pub fn new(weighted: &[(OpKind, f64)]) -> Result<Self, ConfigError> {
        let mut operations = Vec::with_capacity(weighted.len());
        let mut raw = Vec::with_capacity(weighted.len());
        for (op, weight) in weighted {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::Workload(format!(
                    "weight for {op} must be a non-negative number, got {weight}"
                )));
            }
            if *weight > 0.0 {
                operations.push(*op);
                raw.push(*weight);
            }
        }
        let total: f64 = raw.iter().sum();
        if operations.is_empty() || total <= 0.0 {
            return Err(ConfigError::Workload(
                "operation weights must sum to a positive total".into(),
            ));
        }

        let mut running = 0.0;
        let mut cumulative: Vec<f64> = raw
            .iter()
            .map(|w| {
                running += w / total;
                running
            })
            .collect();
        if let Some(last) = cumulative.last_mut() {
            *last = 1.0;
        }
        Ok(Self {
            operations,
            cumulative,
        })
    }

    pub fn select<R: Rng>(&self, rng: &mut R) -> OpKind {
        let r: f64 = rng.random();
        let index = self
            .cumulative
            .partition_point(|&c| c <= r)
            .min(self.operations.len() - 1);
        self.operations[index]
    }

    pub fn operations(&self) -> &[OpKind] {
        &self.operations
    }

    /// Normalized probability of `op`.
    pub fn weight(&self, op: OpKind) -> f64 {
        self.operations
            .iter()
            .position(|o| *o == op)
            .map(|i| {
                let prev = if i == 0 { 0.0 } else { self.cumulative[i - 1] };
                self.cumulative[i] - prev
            })
            .unwrap_or(0.0)
    }

    pub fn contains(&self, op: OpKind) -> bool {
        self.operations.contains(&op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_weights_are_normalized() {
        let mix = OperationMix::new(&[(OpKind::Set, 2.0), (OpKind::Get, 6.0)]).unwrap();
        assert!((mix.weight(OpKind::Set) - 0.25).abs() < 1e-9);
        assert!((mix.weight(OpKind::Get) - 0.75).abs() < 1e-9);
        assert_eq!(mix.weight(OpKind::Del), 0.0);
    }

    #[test]
    fn test_zero_weights_dropped() {
        let mix = OperationMix::new(&[(OpKind::Set, 0.0), (OpKind::Get, 1.0)]).unwrap();
        assert_eq!(mix.operations(), &[OpKind::Get]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..100).all(|_| mix.select(&mut rng) == OpKind::Get));
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(OperationMix::new(&[]).is_err());
        assert!(OperationMix::new(&[(OpKind::Set, 0.0)]).is_err());
        assert!(OperationMix::new(&[(OpKind::Set, -1.0)]).is_err());
        assert!(OperationMix::new(&[(OpKind::Set, f64::NAN)]).is_err());
    }

    #[test]
    fn test_selection_follows_weights() {
        let mix = OperationMix::new(&[
            (OpKind::Set, 0.2),
            (OpKind::Get, 0.7),
            (OpKind::Incr, 0.1),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<OpKind, usize> = HashMap::new();
        let n = 100_000;
        for _ in 0..n {
            *counts.entry(mix.select(&mut rng)).or_insert(0) += 1;
        }
        for (op, expected) in [(OpKind::Set, 0.2), (OpKind::Get, 0.7), (OpKind::Incr, 0.1)] {
            let observed = counts[&op] as f64 / n as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "{op}: observed {observed}, expected {expected}"
            );
        }
    }
}
