//! Command-line argument groups for the `run` and `test-connection` commands.
//!
//! Every flag has an environment variable fallback. Workload flags left
//! unset keep the values of the selected profile, or the defaults when no
//! profile is selected.

use crate::config::duration::parse_duration;
use crate::config::{ExportConfig, IdentityConfig, OutputConfig, RunnerConfig, TestConfig};
use anyhow::Context;
use clap::Args;
use loadgen_core::{
    ConnectionConfig, NodeAddress, OpKind, RunPlan, TlsConfig, ValueSize, WorkloadKind,
    WorkloadSpec,
};
use loadgen_profiles::Profile;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Server host
    #[arg(long, default_value = "localhost", env = "REDIS_HOST")]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = 6379, env = "REDIS_PORT")]
    pub port: u16,

    /// ACL username
    #[arg(long, env = "REDIS_USERNAME")]
    pub username: Option<String>,

    /// Password
    #[arg(long, env = "REDIS_PASSWORD")]
    pub password: Option<String>,

    /// Database number (standalone only)
    #[arg(long, default_value_t = 0, env = "REDIS_DB")]
    pub db: u32,

    /// Connect in cluster mode
    #[arg(long, env = "REDIS_CLUSTER")]
    pub cluster: bool,

    /// Cluster nodes (host:port,...); defaults to --host/--port
    #[arg(long, value_delimiter = ',', env = "REDIS_CLUSTER_NODES")]
    pub cluster_nodes: Vec<NodeAddress>,

    /// Use TLS
    #[arg(long, env = "REDIS_TLS")]
    pub tls: bool,

    /// Skip server certificate verification
    #[arg(long, env = "REDIS_TLS_INSECURE")]
    pub tls_insecure: bool,

    /// PEM bundle of trusted CA certificates
    #[arg(long, value_name = "PATH", env = "REDIS_TLS_CA_CERTS")]
    pub tls_ca_certs: Option<PathBuf>,

    /// PEM client certificate
    #[arg(long, value_name = "PATH", env = "REDIS_TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM client private key
    #[arg(long, value_name = "PATH", env = "REDIS_TLS_KEY_FILE")]
    pub tls_key_file: Option<PathBuf>,

    /// Name used for SNI and certificate verification
    #[arg(long, env = "REDIS_TLS_SERVER_NAME")]
    pub tls_server_name: Option<String>,

    /// Read/write timeout (e.g. 5, 500ms, 2s)
    #[arg(long, default_value = "5s", value_parser = parse_duration, env = "REDIS_SOCKET_TIMEOUT")]
    pub socket_timeout: Duration,

    /// Connect timeout
    #[arg(long, default_value = "5s", value_parser = parse_duration, env = "REDIS_CONNECT_TIMEOUT")]
    pub connect_timeout: Duration,

    /// Maximum connections per client
    #[arg(long, default_value_t = 50, env = "REDIS_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Consecutive failed connects before a connection gives up
    #[arg(long, default_value_t = 3, env = "REDIS_CLIENT_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,

    /// First reconnect delay
    #[arg(long, default_value = "100ms", value_parser = parse_duration, env = "REDIS_BACKOFF_BASE")]
    pub backoff_base: Duration,

    /// Reconnect delay ceiling
    #[arg(long, default_value = "5s", value_parser = parse_duration, env = "REDIS_BACKOFF_MAX")]
    pub backoff_max: Duration,

    /// Idle time after which a connection is pinged before use (0 disables)
    #[arg(long, default_value = "30s", value_parser = parse_duration, env = "REDIS_HEALTH_CHECK_INTERVAL")]
    pub health_check_interval: Duration,

    /// Name announced with CLIENT SETNAME
    #[arg(long, default_value = "kv-loadgen", env = "REDIS_CLIENT_NAME")]
    pub client_name: String,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        let defaults = ConnectionConfig::default();
        ConnectionConfig {
            client_name: self.client_name.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.db,
            cluster_mode: self.cluster,
            cluster_nodes: self.cluster_nodes.clone(),
            tls: TlsConfig {
                enabled: self.tls,
                verify_peer: !self.tls_insecure,
                ca_certs: self.tls_ca_certs.clone(),
                cert_file: self.tls_cert_file.clone(),
                key_file: self.tls_key_file.clone(),
                server_name: self.tls_server_name.clone(),
            },
            socket_timeout: self.socket_timeout,
            connect_timeout: self.connect_timeout,
            max_connections: self.max_connections,
            retry_attempts: self.retry_attempts,
            backoff_base: self.backoff_base,
            backoff_multiplier: defaults.backoff_multiplier,
            backoff_max: self.backoff_max,
            health_check_interval: self.health_check_interval,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// Number of client instances (connection pools)
    #[arg(long, default_value_t = 4, env = "TEST_CLIENT_INSTANCES")]
    pub clients: usize,

    /// Connections held by each client
    #[arg(long, default_value_t = 1, env = "TEST_CONNECTIONS_PER_CLIENT")]
    pub connections_per_client: usize,

    /// Worker threads per client
    #[arg(long, default_value_t = 10, env = "TEST_THREADS_PER_CLIENT")]
    pub threads_per_client: usize,

    /// Test duration (e.g. 60, 30s, 5m, 1h, PT60S); unbounded if not specified
    #[arg(long, value_parser = parse_duration, env = "TEST_DURATION")]
    pub duration: Option<Duration>,

    /// Aggregate throughput cap across all clients
    #[arg(long, env = "TEST_TARGET_OPS_PER_SECOND")]
    pub target_ops_per_second: Option<u64>,

    /// How long a worker waits for a free connection
    #[arg(long, default_value = "1s", value_parser = parse_duration, env = "TEST_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Duration,

    /// How long shutdown waits for workers to exit
    #[arg(long, default_value = "5s", value_parser = parse_duration, env = "TEST_JOIN_TIMEOUT")]
    pub join_timeout: Duration,
}

impl TestArgs {
    pub fn to_plan(&self) -> RunPlan {
        RunPlan::new(
            self.clients,
            self.connections_per_client,
            self.threads_per_client,
        )
        .with_duration(self.duration.filter(|d| !d.is_zero()))
        .with_target_ops_per_second(self.target_ops_per_second)
        .with_acquire_timeout(self.acquire_timeout)
        .with_join_timeout(self.join_timeout)
    }
}

#[derive(Args, Debug, Clone)]
pub struct WorkloadArgs {
    /// Pre-defined workload profile (see list-profiles)
    #[arg(long, env = "TEST_WORKLOAD_PROFILE")]
    pub workload_profile: Option<Profile>,

    /// Workload kind: single, pipelined, transactional or pubsub
    #[arg(long, env = "TEST_WORKLOAD_KIND")]
    pub workload_kind: Option<WorkloadKind>,

    /// Comma-separated list of operations
    #[arg(long, value_delimiter = ',', env = "TEST_OPERATIONS")]
    pub operations: Vec<OpKind>,

    /// Operation weights as JSON ({"SET": 0.4, "GET": 0.6}) or SET=0.4,GET=0.6
    #[arg(long, value_parser = parse_weights, env = "TEST_OPERATION_WEIGHTS")]
    pub operation_weights: Option<BTreeMap<OpKind, f64>>,

    /// Prefix for generated keys
    #[arg(long, env = "TEST_KEY_PREFIX")]
    pub key_prefix: Option<String>,

    /// Range of key ids (0 means ever-increasing ids)
    #[arg(long, env = "TEST_KEY_RANGE")]
    pub key_range: Option<u64>,

    /// Fixed value size in bytes (overrides min/max)
    #[arg(long, env = "TEST_VALUE_SIZE")]
    pub value_size: Option<usize>,

    /// Minimum value size in bytes
    #[arg(long, env = "TEST_VALUE_SIZE_MIN")]
    pub value_size_min: Option<usize>,

    /// Maximum value size in bytes
    #[arg(long, env = "TEST_VALUE_SIZE_MAX")]
    pub value_size_max: Option<usize>,

    /// Batch commands into pipelines
    #[arg(long, env = "TEST_USE_PIPELINE")]
    pub use_pipeline: bool,

    /// Commands per pipeline
    #[arg(long, env = "TEST_PIPELINE_SIZE")]
    pub pipeline_size: Option<usize>,

    /// Commands per transaction
    #[arg(long, env = "TEST_TRANSACTION_SIZE")]
    pub transaction_size: Option<usize>,

    /// Comma-separated list of pub/sub channels
    #[arg(long, value_delimiter = ',', env = "TEST_PUBSUB_CHANNELS")]
    pub pubsub_channels: Vec<String>,

    /// Ratio of read operations (informational)
    #[arg(long, env = "TEST_READ_WRITE_RATIO")]
    pub read_write_ratio: Option<f64>,
}

impl WorkloadArgs {
    /// Start from the profile (or defaults) and apply every flag that was given.
    pub fn to_spec(&self) -> WorkloadSpec {
        let mut spec = self
            .workload_profile
            .map(|p| p.workload())
            .unwrap_or_default();

        if !self.operations.is_empty() {
            spec.operations = self.operations.clone();
            if self.operation_weights.is_none() {
                spec.weights.clear();
            }
        }
        if let Some(weights) = &self.operation_weights {
            spec.weights = weights.clone();
        }
        if let Some(prefix) = &self.key_prefix {
            spec.key_prefix = prefix.clone();
        }
        if let Some(range) = self.key_range {
            spec.key_range = range;
        }
        spec.value_size = match (self.value_size, self.value_size_min, self.value_size_max) {
            (Some(size), _, _) => ValueSize::Fixed(size),
            (None, None, None) => spec.value_size,
            (None, min, max) => {
                let (current_min, current_max) = spec.value_size.bounds();
                ValueSize::Range {
                    min: min.unwrap_or(current_min),
                    max: max.unwrap_or(current_max),
                }
            }
        };
        if let Some(size) = self.pipeline_size {
            spec.pipeline_size = size;
        }
        if let Some(size) = self.transaction_size {
            spec.transaction_size = size;
        }
        if !self.pubsub_channels.is_empty() {
            spec.channels = self.pubsub_channels.clone();
        }
        if let Some(ratio) = self.read_write_ratio {
            spec.read_write_ratio = ratio;
        }

        if let Some(kind) = self.workload_kind {
            spec.kind = kind;
        } else if self.use_pipeline {
            spec.kind = WorkloadKind::Pipelined;
        } else if self.workload_profile.is_none()
            && spec.weighted_operations().iter().all(|(op, _)| op.is_pubsub())
        {
            spec.kind = WorkloadKind::PubSub;
        }
        spec
    }
}

/// Parse operation weights given as a JSON object or as `OP=weight` pairs.
pub fn parse_weights(s: &str) -> anyhow::Result<BTreeMap<OpKind, f64>> {
    let s = s.trim();
    if s.starts_with('{') {
        let raw: BTreeMap<String, f64> =
            serde_json::from_str(s).context("Invalid JSON operation weights")?;
        return raw
            .into_iter()
            .map(|(op, w)| Ok((op.parse::<OpKind>().map_err(anyhow::Error::msg)?, w)))
            .collect();
    }
    s.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (op, weight) = pair
                .split_once('=')
                .with_context(|| format!("Expected OP=weight, got '{pair}'"))?;
            let op = op.parse::<OpKind>().map_err(anyhow::Error::msg)?;
            let weight: f64 = weight
                .trim()
                .parse()
                .with_context(|| format!("Invalid weight for {op}: '{weight}'"))?;
            Ok((op, weight))
        })
        .collect()
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Logging level: DEBUG, INFO, WARNING or ERROR (RUST_LOG takes precedence)
    #[arg(long, default_value = "INFO", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH", env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Seconds between periodic stats reports (0 disables)
    #[arg(long, default_value_t = 5, env = "METRICS_INTERVAL")]
    pub metrics_interval: u64,

    /// Suppress periodic stats output
    #[arg(long)]
    pub quiet: bool,

    /// Write the final summary as JSON to this file instead of printing it
    #[arg(long, value_name = "PATH", env = "OUTPUT_FILE")]
    pub output_file: Option<PathBuf>,
}

impl OutputArgs {
    pub fn to_config(&self) -> OutputConfig {
        OutputConfig {
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            metrics_interval: self.metrics_interval,
            quiet: self.quiet,
            output_file: self.output_file.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Push metric batches as JSON to http://host:port/path
    #[arg(long, value_name = "URL", env = "METRICS_EXPORT_ENDPOINT")]
    pub export_endpoint: Option<String>,

    /// Append metric batches as JSON lines to this file
    #[arg(long, value_name = "PATH", env = "METRICS_EXPORT_FILE")]
    pub export_file: Option<PathBuf>,

    /// Service name label
    #[arg(long, default_value = "kv-loadgen", env = "SERVICE_NAME")]
    pub service_name: String,

    /// Application name label; the profile name is appended
    #[arg(long, default_value = "rust", env = "APP_NAME")]
    pub app_name: String,

    /// Instance id label (random UUID if not provided)
    #[arg(long, env = "INSTANCE_ID")]
    pub instance_id: Option<String>,

    /// Run id label (random UUID if not provided)
    #[arg(long, env = "RUN_ID")]
    pub run_id: Option<String>,

    /// Version label (defaults to the package version)
    #[arg(long, env = "VERSION")]
    pub version_label: Option<String>,
}

impl ExportArgs {
    pub fn to_configs(&self) -> (ExportConfig, IdentityConfig) {
        (
            ExportConfig {
                endpoint: self.export_endpoint.clone(),
                file: self.export_file.clone(),
            },
            IdentityConfig {
                app_name: self.app_name.clone(),
                service_name: self.service_name.clone(),
                instance_id: self.instance_id.clone(),
                run_id: self.run_id.clone(),
                version: self.version_label.clone(),
            },
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub test: TestArgs,

    #[command(flatten)]
    pub workload: WorkloadArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub export: ExportArgs,

    /// Load the configuration from a YAML/JSON file instead of the flags above
    #[arg(long, value_name = "PATH", env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long, value_name = "PATH")]
    pub save_config: Option<PathBuf>,

    /// Seed worker random number generators for a repeatable operation sequence
    #[arg(long, env = "TEST_SEED")]
    pub seed: Option<u64>,
}

impl RunArgs {
    /// The effective configuration: the config file if given, else the flags.
    pub fn to_config(&self) -> anyhow::Result<RunnerConfig> {
        if let Some(path) = &self.config_file {
            return RunnerConfig::load(path);
        }
        let (export, identity) = self.export.to_configs();
        Ok(RunnerConfig {
            connection: self.connection.to_config(),
            test: TestConfig {
                profile: self.workload.workload_profile,
                plan: self.test.to_plan(),
                workload: self.workload.to_spec(),
            },
            output: self.output.to_config(),
            export,
            identity,
        })
    }
}
