//! Background subscriber for pub/sub workloads.

use crate::connection::Backoff;
use loadgen_core::{ConnectionConfig, Connector, ErrorKind};
use loadgen_metrics::MetricsSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const SLEEP_STEP: Duration = Duration::from_millis(50);

/// Join bound used when a workload shuts its listener down.
pub const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A thread holding a dedicated subscription and metering every message it
/// receives. Publishers never wait on it.
pub struct Listener {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn spawn<C: Connector>(
        name: String,
        connector: Arc<C>,
        channels: Vec<String>,
        config: &ConnectionConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let backoff = Backoff::new(
            config.backoff_base,
            config.backoff_multiplier,
            config.backoff_max,
        );
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            listen(&thread_name, &*connector, &channels, backoff, &*sink, &thread_stop)
        })?;
        tracing::debug!("{name} started");
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait up to `timeout` for it to exit. A thread
    /// that misses the bound is detached. Idempotent.
    pub fn stop(&mut self, timeout: Duration) {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                tracing::error!("{} panicked", self.name);
            }
        } else {
            tracing::warn!("{} did not stop within {timeout:?}; detaching", self.name);
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop(LISTENER_JOIN_TIMEOUT);
    }
}

fn listen<C: Connector>(
    name: &str,
    connector: &C,
    channels: &[String],
    mut backoff: Backoff,
    sink: &dyn MetricsSink,
    stop: &AtomicBool,
) {
    let record_failure = |kind: ErrorKind| {
        for channel in channels {
            sink.record_message(channel, Err(kind));
        }
    };

    while !stop.load(Ordering::Acquire) {
        let mut subscription = match connector.subscribe(channels) {
            Ok(subscription) => {
                tracing::debug!("{name} subscribed to {}", channels.join(","));
                backoff.reset();
                subscription
            }
            Err(e) => {
                record_failure(e.kind());
                let delay = backoff.next_delay();
                tracing::warn!("{name} failed to subscribe: {e}. Retrying in {delay:?}");
                sleep_unless_stopped(delay, stop);
                continue;
            }
        };

        while !stop.load(Ordering::Acquire) {
            match subscription.next_message(POLL_INTERVAL) {
                Ok(Some(message)) => sink.record_message(&message.channel, Ok(())),
                Ok(None) => {}
                Err(e) => {
                    record_failure(e.kind());
                    tracing::warn!("{name} lost its subscription: {e}");
                    break;
                }
            }
        }
        subscription.close();

        if !stop.load(Ordering::Acquire) {
            sleep_unless_stopped(backoff.next_delay(), stop);
        }
    }
    tracing::debug!("{name} stopped");
}

fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLEEP_STEP.min(deadline - now));
    }
}
