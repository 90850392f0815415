//! kv-loadgen
//!
//! A load generator for Redis-protocol key-value stores. It drives a
//! configurable mix of commands from many worker threads over pools of
//! resilient connections, and reports latency percentiles, error
//! classifications and connection churn.
//!
//! # Workspace crates
//!
//! - `loadgen_core` - operations, errors, configuration and client traits
//! - `resp_client` - blocking RESP client over TCP or rustls
//! - `loadgen_metrics` - aggregation, snapshots, reports and exporters
//! - `loadgen_engine` - connection managers, pools, workloads and the scheduler
//! - `loadgen_profiles` - the named workload catalogue
//!
//! # CLI Usage
//!
//! ```bash
//! # One minute of the basic read/write profile
//! kv-loadgen run --workload-profile basic_rw --duration 60
//!
//! # Pipelined SET/GET against a cluster, capped at 50k ops/sec
//! kv-loadgen run --cluster --cluster-nodes n1:7000,n2:7001 \
//!   --operations SET,GET --use-pipeline --pipeline-size 20 \
//!   --target-ops-per-second 50000
//!
//! # Save the effective configuration, then reuse it
//! kv-loadgen run --workload-profile pubsub_heavy --save-config run.yaml
//! kv-loadgen run --config-file run.yaml --output-file summary.json
//! ```

pub mod cli;
pub mod config;
pub mod logging;
pub mod runner;
pub mod summary;

pub use config::RunnerConfig;
