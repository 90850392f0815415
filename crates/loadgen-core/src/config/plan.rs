use super::{secs, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many pools, connections and workers to run, and for how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPlan {
    /// Number of independent pools (client instances).
    pub client_instances: usize,
    /// Connection managers in each pool.
    pub connections_per_pool: usize,
    /// Worker threads bound to each pool.
    pub threads_per_pool: usize,
    /// Run length. `None` runs until stopped.
    #[serde(with = "secs::option")]
    pub duration: Option<Duration>,
    /// Cap on aggregate throughput across all pools.
    pub target_ops_per_second: Option<u64>,
    /// How long a worker waits for a free connection.
    #[serde(with = "secs")]
    pub acquire_timeout: Duration,
    /// How long shutdown waits for workers to exit.
    #[serde(with = "secs")]
    pub join_timeout: Duration,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            client_instances: 4,
            connections_per_pool: 1,
            threads_per_pool: 10,
            duration: None,
            target_ops_per_second: None,
            acquire_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl RunPlan {
    pub fn new(client_instances: usize, connections_per_pool: usize, threads_per_pool: usize) -> Self {
        Self {
            client_instances,
            connections_per_pool,
            threads_per_pool,
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_target_ops_per_second(mut self, target: Option<u64>) -> Self {
        self.target_ops_per_second = target;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn total_workers(&self) -> usize {
        self.client_instances * self.threads_per_pool
    }

    /// Rate target for one pool, if a global target is set.
    pub fn per_pool_target(&self) -> Option<f64> {
        self.target_ops_per_second
            .map(|t| t as f64 / self.client_instances.max(1) as f64)
    }

    pub fn validate(&self, max_connections: usize) -> Result<(), ConfigError> {
        if self.client_instances == 0 {
            return Err(ConfigError::Plan(
                "number of clients must be greater than 0".into(),
            ));
        }
        if self.connections_per_pool == 0 {
            return Err(ConfigError::Plan(
                "connections per client must be greater than 0".into(),
            ));
        }
        if self.threads_per_pool == 0 {
            return Err(ConfigError::Plan(
                "number of threads per client must be greater than 0".into(),
            ));
        }
        if self.connections_per_pool > max_connections {
            return Err(ConfigError::Plan(format!(
                "connections per client ({}) exceeds max_connections ({max_connections})",
                self.connections_per_pool
            )));
        }
        if self.target_ops_per_second == Some(0) {
            return Err(ConfigError::Plan(
                "target ops/sec must be greater than 0 when set".into(),
            ));
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Plan("duration must be greater than 0".into()));
        }
        if self.acquire_timeout.is_zero() {
            return Err(ConfigError::Plan("acquire timeout must be non-zero".into()));
        }
        Ok(())
    }
}
