//! Trait definitions for the blocking key-value client.

use crate::command::{Command, Reply};
use crate::error::ClientError;
use std::time::Duration;

/// One established connection to the target store.
///
/// Every call blocks the current thread for one network round trip, bounded
/// by the socket timeout of the underlying connection.
pub trait KvClient: Send {
    /// Liveness probe.
    fn ping(&mut self) -> Result<(), ClientError>;

    /// Execute a single command.
    fn execute(&mut self, command: &Command) -> Result<Reply, ClientError>;

    /// Send every command in one round trip.
    ///
    /// The outer error is a transport failure affecting the whole batch. The
    /// inner results report per-command server errors, so one rejected
    /// command does not fail its neighbours.
    fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Result<Reply, ClientError>>, ClientError>;

    /// Execute the commands atomically. Any failure fails the whole batch.
    fn transaction(&mut self, commands: &[Command]) -> Result<Vec<Reply>, ClientError>;

    /// Close the connection. Errors are ignored.
    fn close(&mut self);
}

/// A message delivered on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// A dedicated subscriber connection.
pub trait Subscription: Send {
    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, ClientError>;

    fn close(&mut self);
}

/// Factory for client connections.
///
/// A connector may know several nodes (cluster mode). Callers pick a node by
/// position; implementations wrap the index around.
pub trait Connector: Send + Sync + 'static {
    type Client: KvClient + 'static;

    /// Open and authenticate a connection to the given node.
    fn connect(&self, node: usize) -> Result<Self::Client, ClientError>;

    /// Number of nodes this connector can reach.
    fn node_count(&self) -> usize {
        1
    }

    /// Open a dedicated connection subscribed to `channels`.
    fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>, ClientError>;

    /// Human readable description of the target, safe for logging.
    fn describe(&self) -> String;
}
