//! Blocking RESP2 client.
//!
//! Each [`RespClient`] owns one TCP (optionally TLS) stream and performs one
//! request/response round trip per call, bounded by the configured socket
//! timeout. [`RespConnector`] builds authenticated clients and subscriber
//! connections from a [`ConnectionConfig`](loadgen_core::ConnectionConfig).

mod client;
mod connector;
mod resp;
mod stream;
mod subscription;
mod tls;

pub use client::RespClient;
pub use connector::RespConnector;
pub use resp::{encode_command, read_value, Value};
pub use subscription::RespSubscription;
