//! In-memory connector used by the engine tests.

#![allow(dead_code)]

use loadgen_core::{
    ClientError, Command, ConnectionConfig, Connector, KvClient, Message, Reply, Subscription,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Knobs for the fake store.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Connect attempts that fail on each node before one succeeds.
    pub connect_failures_per_node: usize,
    /// Every connect attempt fails.
    pub refuse_all: bool,
    /// Time each request takes.
    pub latency: Duration,
    /// Index inside every pipeline whose command gets an error reply.
    pub failing_pipeline_index: Option<usize>,
    /// Every transaction is aborted.
    pub abort_transactions: bool,
    /// Number of nodes reported by the connector.
    pub nodes: usize,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub connects: AtomicU64,
    pub requests: AtomicU64,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub open_clients: AtomicUsize,
    pub subscriptions: AtomicUsize,
    pub pings: AtomicU64,
    /// When set, every PING fails with a broken pipe.
    pub fail_pings: AtomicBool,
    attempts_by_node: Mutex<HashMap<usize, usize>>,
}

impl Stats {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    pub behavior: Behavior,
    pub stats: Arc<Stats>,
}

impl FakeConnector {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(Stats::default()),
        }
    }
}

pub struct FakeClient {
    behavior: Behavior,
    stats: Arc<Stats>,
    closed: bool,
}

impl FakeClient {
    fn request(&self) {
        self.stats.enter();
        if !self.behavior.latency.is_zero() {
            thread::sleep(self.behavior.latency);
        }
        self.stats.leave();
    }
}

impl KvClient for FakeClient {
    fn ping(&mut self) -> Result<(), ClientError> {
        self.stats.pings.fetch_add(1, Ordering::SeqCst);
        if self.stats.fail_pings.load(Ordering::SeqCst) {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<Reply, ClientError> {
        self.request();
        match command.name().as_str() {
            "GET" => Ok(Reply::Nil),
            "INCR" | "DEL" | "PUBLISH" => Ok(Reply::Int(1)),
            _ => Ok(Reply::Status("OK".into())),
        }
    }

    fn pipeline(
        &mut self,
        commands: &[Command],
    ) -> Result<Vec<Result<Reply, ClientError>>, ClientError> {
        self.request();
        Ok((0..commands.len())
            .map(|i| {
                if Some(i) == self.behavior.failing_pipeline_index {
                    Err(ClientError::server("WRONGTYPE Operation against a key holding the wrong kind of value"))
                } else {
                    Ok(Reply::Status("OK".into()))
                }
            })
            .collect())
    }

    fn transaction(&mut self, commands: &[Command]) -> Result<Vec<Reply>, ClientError> {
        self.request();
        if self.behavior.abort_transactions {
            return Err(ClientError::TransactionAborted(
                "EXECABORT Transaction discarded because of previous errors.".into(),
            ));
        }
        Ok(vec![Reply::Status("OK".into()); commands.len()])
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.open_clients.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeClient {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct FakeSubscription {
    channels: Vec<String>,
    stop: Arc<AtomicBool>,
}

impl Subscription for FakeSubscription {
    fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, ClientError> {
        // One message per poll, paced so tests see a steady trickle.
        thread::sleep(timeout.min(Duration::from_millis(5)));
        if self.stop.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(Message {
            channel: self.channels[0].clone(),
            payload: b"hello".to_vec(),
        }))
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Connector for FakeConnector {
    type Client = FakeClient;

    fn connect(&self, node: usize) -> Result<FakeClient, ClientError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if self.behavior.refuse_all {
            return Err(refused());
        }
        {
            let mut attempts = self.stats.attempts_by_node.lock().unwrap();
            let count = attempts.entry(node).or_insert(0);
            *count += 1;
            if *count <= self.behavior.connect_failures_per_node {
                return Err(refused());
            }
        }
        self.stats.open_clients.fetch_add(1, Ordering::SeqCst);
        Ok(FakeClient {
            behavior: self.behavior.clone(),
            stats: Arc::clone(&self.stats),
            closed: false,
        })
    }

    fn node_count(&self) -> usize {
        self.behavior.nodes.max(1)
    }

    fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>, ClientError> {
        self.stats.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSubscription {
            channels: channels.to_vec(),
            stop: Arc::new(AtomicBool::new(false)),
        }))
    }

    fn describe(&self) -> String {
        "fake://memory".to_string()
    }
}

fn refused() -> ClientError {
    ClientError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
}

/// Connection settings with fast backoff for tests.
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig::default()
        .with_backoff(Duration::from_millis(5), 2.0, Duration::from_millis(40))
        .with_retry_attempts(3)
}
