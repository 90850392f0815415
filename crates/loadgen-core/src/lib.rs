//! Core types for kv-loadgen.
//!
//! This crate holds the vocabulary shared by every other crate in the
//! workspace:
//!
//! - [`ErrorKind`] and [`ClientError`]: the error taxonomy used in metrics
//! - [`OpKind`], [`Command`] and [`Reply`]: the operations a workload issues
//! - [`OperationOutcome`]: the unit of measurement handed to the aggregator
//! - [`KvClient`], [`Connector`] and [`Subscription`]: the seams to the
//!   network client
//! - [`ConnectionConfig`], [`WorkloadSpec`] and [`RunPlan`]: run configuration

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod outcome;

pub use client::{Connector, KvClient, Message, Subscription};
pub use command::{Command, OpKind, Reply};
pub use config::{
    ConfigError, ConnectionConfig, NodeAddress, RunPlan, TlsConfig, ValueSize, WorkloadKind,
    WorkloadSpec,
};
pub use error::{ClientError, ErrorKind};
pub use outcome::OperationOutcome;
