//! The unit of measurement produced by one executed operation.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of one executed operation.
///
/// Produced by a workload, consumed exactly once by the metrics aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// Metrics label of the operation, usually the command name.
    pub operation: &'static str,
    pub success: bool,
    pub latency: Duration,
    /// Set if and only if `success` is false.
    pub error: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl OperationOutcome {
    pub fn success(operation: &'static str, latency: Duration) -> Self {
        Self {
            operation,
            success: true,
            latency,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(operation: &'static str, latency: Duration, kind: ErrorKind) -> Self {
        Self {
            operation,
            success: false,
            latency,
            error: Some(kind),
            timestamp: Utc::now(),
        }
    }

    /// Build an outcome from a result, using the error's classification.
    pub fn from_result<T>(
        operation: &'static str,
        latency: Duration,
        result: &Result<T, ErrorKind>,
    ) -> Self {
        match result {
            Ok(_) => Self::success(operation, latency),
            Err(kind) => Self::failure(operation, latency, *kind),
        }
    }
}
