//! The load generation engine.
//!
//! - [`connection`]: one resilient connection with reconnect and backoff
//! - [`pool`]: a fixed arena of connections shared by one client's workers
//! - [`workload`]: what a worker executes per unit of work
//! - [`scheduler`]: worker threads, rate limiting, reporting and shutdown
//!
//! [`start`] is the entry point for a run against a real server. Tests and
//! embedders can drive [`Engine`] with any [`loadgen_core::Connector`].

pub mod connection;
pub mod error;
pub mod pool;
pub mod scheduler;
pub mod workload;

pub use connection::{Backoff, ConnectionManager, ConnectionState, ManagerId};
pub use error::{EngineError, ExecError, PoolError};
pub use pool::{ConnectionPool, PoolHealth, PooledConnection};
pub use scheduler::{
    start, Engine, RateLimiter, RunHandle, StopSignal, WorkerExit, DEFAULT_REPORT_INTERVAL,
    POOL_ACQUIRE,
};
pub use workload::{OperationMix, SharedWorkload, Workload};
