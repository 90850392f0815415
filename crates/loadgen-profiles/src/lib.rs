//! Named workload profiles.
//!
//! Each profile expands to a complete [`WorkloadSpec`]. Command-line flags
//! given alongside a profile override individual fields afterwards.

use loadgen_core::{OpKind, ValueSize, WorkloadKind, WorkloadSpec};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration a profile suggests when the run does not set one.
pub const PROFILE_DURATION: Duration = Duration::from_secs(60);

/// Pre-defined workload profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    BasicRw,
    HighThroughput,
    ListOperations,
    PubsubHeavy,
    TransactionHeavy,
    AsyncMixed,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::BasicRw => write!(f, "basic_rw"),
            Profile::HighThroughput => write!(f, "high_throughput"),
            Profile::ListOperations => write!(f, "list_operations"),
            Profile::PubsubHeavy => write!(f, "pubsub_heavy"),
            Profile::TransactionHeavy => write!(f, "transaction_heavy"),
            Profile::AsyncMixed => write!(f, "async_mixed"),
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "basic_rw" => Ok(Profile::BasicRw),
            "high_throughput" => Ok(Profile::HighThroughput),
            "list_operations" => Ok(Profile::ListOperations),
            "pubsub_heavy" => Ok(Profile::PubsubHeavy),
            "transaction_heavy" => Ok(Profile::TransactionHeavy),
            "async_mixed" => Ok(Profile::AsyncMixed),
            _ => Err(format!(
                "Unknown workload profile: {s} (available: {})",
                Profile::all()
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

impl Profile {
    /// Every profile in catalogue order.
    pub fn all() -> &'static [Profile] {
        &[
            Profile::BasicRw,
            Profile::HighThroughput,
            Profile::ListOperations,
            Profile::PubsubHeavy,
            Profile::TransactionHeavy,
            Profile::AsyncMixed,
        ]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Profile::BasicRw => "Balanced string reads and writes with occasional deletes",
            Profile::HighThroughput => "Read-heavy SET/GET in pipelines of 10 over a wide keyspace",
            Profile::ListOperations => "List pushes, range reads and pops",
            Profile::PubsubHeavy => "Publishing to three channels with background subscribers",
            Profile::TransactionHeavy => "SET/GET batches of 5 inside MULTI/EXEC",
            Profile::AsyncMixed => "Mixed string and list commands in pipelines of 20",
        }
    }

    /// The workload this profile runs.
    pub fn workload(&self) -> WorkloadSpec {
        match self {
            Profile::BasicRw => WorkloadSpec::new(
                WorkloadKind::Single,
                vec![OpKind::Set, OpKind::Get, OpKind::Del],
            )
            .with_weights([(OpKind::Set, 0.4), (OpKind::Get, 0.5), (OpKind::Del, 0.1)])
            .with_value_size(ValueSize::Fixed(100))
            .with_keys("test_key", 10_000),

            Profile::HighThroughput => {
                WorkloadSpec::new(WorkloadKind::Pipelined, vec![OpKind::Set, OpKind::Get])
                    .with_weights([(OpKind::Set, 0.4), (OpKind::Get, 0.6)])
                    .with_value_size(ValueSize::Fixed(50))
                    .with_keys("perf_test", 50_000)
                    .with_pipeline_size(10)
            }

            Profile::ListOperations => WorkloadSpec::new(
                WorkloadKind::Single,
                vec![OpKind::LPush, OpKind::LRange, OpKind::LPop],
            )
            .with_weights([
                (OpKind::LPush, 0.4),
                (OpKind::LRange, 0.4),
                (OpKind::LPop, 0.2),
            ])
            .with_value_size(ValueSize::Fixed(100))
            .with_keys("list_test", 10_000),

            Profile::PubsubHeavy => WorkloadSpec::new(
                WorkloadKind::PubSub,
                vec![OpKind::Publish, OpKind::Subscribe],
            )
            .with_weights([(OpKind::Publish, 0.7), (OpKind::Subscribe, 0.3)])
            .with_value_size(ValueSize::Fixed(200))
            .with_channels(vec![
                "channel1".to_string(),
                "channel2".to_string(),
                "channel3".to_string(),
            ]),

            Profile::TransactionHeavy => {
                WorkloadSpec::new(WorkloadKind::Transactional, vec![OpKind::Set, OpKind::Get])
                    .with_value_size(ValueSize::Fixed(100))
                    .with_keys("tx_test", 10_000)
                    .with_transaction_size(5)
            }

            Profile::AsyncMixed => WorkloadSpec::new(
                WorkloadKind::Pipelined,
                vec![OpKind::Set, OpKind::Get, OpKind::LPush, OpKind::LRange],
            )
            .with_weights([
                (OpKind::Set, 0.3),
                (OpKind::Get, 0.4),
                (OpKind::LPush, 0.2),
                (OpKind::LRange, 0.1),
            ])
            .with_value_size(ValueSize::Fixed(150))
            .with_pipeline_size(20),
        }
    }

    /// Multi-line human readable description used by `describe-profile`.
    pub fn details(&self) -> String {
        let workload = self.workload();
        let mut lines = vec![
            format!("Workload Profile: {self}"),
            format!("  Description: {}", self.description()),
            format!("  Kind: {}", workload.kind),
        ];
        let ops = workload
            .weighted_operations()
            .iter()
            .map(|(op, weight)| {
                if workload.weights.is_empty() {
                    op.name().to_string()
                } else {
                    format!("{}={weight}", op.name())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("  Operations: {ops}"));
        match workload.value_size {
            ValueSize::Fixed(n) => lines.push(format!("  Value size: {n} bytes")),
            ValueSize::Range { min, max } => {
                lines.push(format!("  Value size: {min}-{max} bytes"))
            }
        }
        match workload.kind {
            WorkloadKind::Pipelined => {
                lines.push(format!("  Pipeline size: {}", workload.pipeline_size))
            }
            WorkloadKind::Transactional => {
                lines.push(format!("  Transaction size: {}", workload.transaction_size))
            }
            WorkloadKind::PubSub => {
                lines.push(format!("  Channels: {}", workload.channels.join(", ")))
            }
            WorkloadKind::Single => {}
        }
        if workload.kind != WorkloadKind::PubSub {
            lines.push(format!(
                "  Keys: {}:<0..{}>",
                workload.key_prefix, workload.key_range
            ));
        }
        lines.push(format!(
            "  Default duration: {}s",
            PROFILE_DURATION.as_secs()
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_profile_is_valid() {
        for profile in Profile::all() {
            profile
                .workload()
                .validate()
                .unwrap_or_else(|e| panic!("{profile}: {e}"));
        }
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for profile in Profile::all() {
            assert_eq!(profile.to_string().parse::<Profile>().unwrap(), *profile);
        }
        assert_eq!("ASYNC-MIXED".parse::<Profile>().unwrap(), Profile::AsyncMixed);
    }

    #[test]
    fn test_unknown_profile_lists_alternatives() {
        let err = "read_only".parse::<Profile>().unwrap_err();
        assert!(err.contains("read_only"));
        assert!(err.contains("basic_rw"));
    }

    #[test]
    fn test_async_mixed_is_pipelined_batch_of_twenty() {
        let workload = Profile::AsyncMixed.workload();
        assert_eq!(workload.kind, WorkloadKind::Pipelined);
        assert_eq!(workload.batch_size(), 20);
    }

    #[test]
    fn test_transaction_heavy_weights_evenly() {
        let workload = Profile::TransactionHeavy.workload();
        assert_eq!(workload.kind, WorkloadKind::Transactional);
        assert_eq!(
            workload.weighted_operations(),
            vec![(OpKind::Set, 1.0), (OpKind::Get, 1.0)]
        );
    }

    #[test]
    fn test_details_mentions_weights() {
        let details = Profile::BasicRw.details();
        assert!(details.contains("basic_rw"));
        assert!(details.contains("GET=0.5"));
        assert!(details.contains("test_key"));
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&Profile::PubsubHeavy).unwrap();
        assert_eq!(json, "\"pubsub_heavy\"");
    }
}
