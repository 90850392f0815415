use super::ConfigError;
use crate::command::OpKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of workload behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// One command per round trip.
    Single,
    /// `pipeline_size` commands per round trip, isolated failures.
    Pipelined,
    /// `transaction_size` commands in MULTI/EXEC, all-or-nothing.
    Transactional,
    /// Publishers on the request loop, a background subscriber for receipt.
    #[serde(rename = "pubsub")]
    PubSub,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Single => write!(f, "single"),
            WorkloadKind::Pipelined => write!(f, "pipelined"),
            WorkloadKind::Transactional => write!(f, "transactional"),
            WorkloadKind::PubSub => write!(f, "pubsub"),
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "basic" => Ok(WorkloadKind::Single),
            "pipelined" | "pipeline" => Ok(WorkloadKind::Pipelined),
            "transactional" | "transaction" => Ok(WorkloadKind::Transactional),
            "pubsub" | "pub_sub" => Ok(WorkloadKind::PubSub),
            _ => Err(format!("Unknown workload kind: {s}")),
        }
    }
}

/// Size policy for generated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSize {
    Fixed(usize),
    Range { min: usize, max: usize },
}

impl ValueSize {
    pub fn bounds(&self) -> (usize, usize) {
        match *self {
            ValueSize::Fixed(n) => (n, n),
            ValueSize::Range { min, max } => (min, max),
        }
    }
}

/// What the workers do on every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSpec {
    pub kind: WorkloadKind,
    pub operations: Vec<OpKind>,
    /// Relative weights. When empty, operations are chosen uniformly.
    pub weights: BTreeMap<OpKind, f64>,
    pub value_size: ValueSize,
    pub key_prefix: String,
    /// Keys are drawn uniformly from `0..key_range`; zero means a counter.
    pub key_range: u64,
    pub pipeline_size: usize,
    pub transaction_size: usize,
    pub channels: Vec<String>,
    /// Share of read operations intended by the profile.
    pub read_write_ratio: f64,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            kind: WorkloadKind::Single,
            operations: vec![OpKind::Set, OpKind::Get],
            weights: BTreeMap::new(),
            value_size: ValueSize::Range { min: 100, max: 1000 },
            key_prefix: "test_key".to_string(),
            key_range: 10_000,
            pipeline_size: 10,
            transaction_size: 5,
            channels: vec!["test_channel".to_string()],
            read_write_ratio: 0.7,
        }
    }
}

impl WorkloadSpec {
    pub fn new(kind: WorkloadKind, operations: Vec<OpKind>) -> Self {
        Self {
            kind,
            operations,
            ..Default::default()
        }
    }

    pub fn with_weights(mut self, weights: impl IntoIterator<Item = (OpKind, f64)>) -> Self {
        self.weights = weights.into_iter().collect();
        self
    }

    pub fn with_value_size(mut self, value_size: ValueSize) -> Self {
        self.value_size = value_size;
        self
    }

    pub fn with_keys(mut self, prefix: impl Into<String>, range: u64) -> Self {
        self.key_prefix = prefix.into();
        self.key_range = range;
        self
    }

    pub fn with_pipeline_size(mut self, size: usize) -> Self {
        self.pipeline_size = size;
        self
    }

    pub fn with_transaction_size(mut self, size: usize) -> Self {
        self.transaction_size = size;
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    /// Candidate operations paired with their raw weights.
    ///
    /// Configured weights define the candidate set when present; otherwise
    /// every listed operation gets weight 1.
    pub fn weighted_operations(&self) -> Vec<(OpKind, f64)> {
        if self.weights.is_empty() {
            self.operations.iter().map(|op| (*op, 1.0)).collect()
        } else {
            self.weights.iter().map(|(op, w)| (*op, *w)).collect()
        }
    }

    /// Number of commands one unit of work issues.
    pub fn batch_size(&self) -> usize {
        match self.kind {
            WorkloadKind::Pipelined => self.pipeline_size,
            WorkloadKind::Transactional => self.transaction_size,
            WorkloadKind::Single | WorkloadKind::PubSub => 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weighted = self.weighted_operations();
        if weighted.is_empty() {
            return Err(ConfigError::Workload("no operations configured".into()));
        }
        for (op, weight) in &weighted {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::Workload(format!(
                    "weight for {op} must be a non-negative number, got {weight}"
                )));
            }
        }
        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(ConfigError::Workload(
                "operation weights must sum to a positive total".into(),
            ));
        }

        match self.kind {
            WorkloadKind::PubSub => {
                if let Some((op, _)) = weighted.iter().find(|(op, _)| !op.is_pubsub()) {
                    return Err(ConfigError::Workload(format!(
                        "{op} is not supported by a pubsub workload"
                    )));
                }
                if self.channels.is_empty() {
                    return Err(ConfigError::Workload(
                        "pubsub workload needs at least one channel".into(),
                    ));
                }
            }
            _ => {
                if weighted.iter().any(|(op, _)| *op == OpKind::Subscribe) {
                    return Err(ConfigError::Workload(format!(
                        "SUBSCRIBE requires a pubsub workload, not {}",
                        self.kind
                    )));
                }
                if weighted.iter().any(|(op, _)| *op == OpKind::Publish) && self.channels.is_empty()
                {
                    return Err(ConfigError::Workload(
                        "PUBLISH needs at least one channel".into(),
                    ));
                }
            }
        }

        if self.batch_size() == 0 {
            return Err(ConfigError::Workload(format!(
                "batch size for a {} workload must be greater than 0",
                self.kind
            )));
        }

        let (min, max) = self.value_size.bounds();
        if min > max {
            return Err(ConfigError::Workload(format!(
                "value size minimum ({min}) exceeds maximum ({max})"
            )));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Workload("key prefix must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_operations_default_uniform() {
        let spec = WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Set, OpKind::Get]);
        assert_eq!(
            spec.weighted_operations(),
            vec![(OpKind::Set, 1.0), (OpKind::Get, 1.0)]
        );
    }

    #[test]
    fn test_weights_define_candidates() {
        let spec = WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Set])
            .with_weights([(OpKind::Get, 0.6), (OpKind::Set, 0.4)]);
        let ops: Vec<OpKind> = spec.weighted_operations().iter().map(|(op, _)| *op).collect();
        assert!(ops.contains(&OpKind::Get));
        assert!(ops.contains(&OpKind::Set));
    }

    #[test]
    fn test_validate_rejects_zero_total() {
        let spec = WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Set])
            .with_weights([(OpKind::Set, 0.0)]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let spec = WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Set])
            .with_weights([(OpKind::Set, 1.0), (OpKind::Get, -0.5)]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_pubsub_rules() {
        let spec = WorkloadSpec::new(WorkloadKind::PubSub, vec![OpKind::Publish, OpKind::Get]);
        assert!(spec.validate().is_err());

        let spec = WorkloadSpec::new(WorkloadKind::PubSub, vec![OpKind::Publish])
            .with_channels(Vec::new());
        assert!(spec.validate().is_err());

        let spec = WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Subscribe]);
        assert!(spec.validate().is_err());

        let spec =
            WorkloadSpec::new(WorkloadKind::PubSub, vec![OpKind::Publish, OpKind::Subscribe]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_batch_and_value_size() {
        let spec = WorkloadSpec::new(WorkloadKind::Pipelined, vec![OpKind::Set]).with_pipeline_size(0);
        assert!(spec.validate().is_err());

        let spec = WorkloadSpec::new(WorkloadKind::Single, vec![OpKind::Set])
            .with_value_size(ValueSize::Range { min: 10, max: 5 });
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_deserialize_json() {
        let json = r#"{
            "kind": "pipelined",
            "operations": ["SET", "GET"],
            "weights": {"SET": 0.3, "GET": 0.7},
            "value_size": {"fixed": 64},
            "pipeline_size": 20
        }"#;
        let spec: WorkloadSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.kind, WorkloadKind::Pipelined);
        assert_eq!(spec.value_size, ValueSize::Fixed(64));
        assert_eq!(spec.weights.get(&OpKind::Get), Some(&0.7));
        assert_eq!(spec.batch_size(), 20);
        assert!(spec.validate().is_ok());
    }
}
