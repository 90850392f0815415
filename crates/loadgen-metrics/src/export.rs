//! Push-style export of periodic metric batches.
//!
//! A batch is a flat list of labelled counters and histograms derived from one
//! [`MetricsSnapshot`]. Exporters are synchronous and called from the reporter
//! thread, so a slow backend delays the next report but never a worker.

use crate::histogram::HistogramSnapshot;
use crate::snapshot::{MetricsSnapshot, RunIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const OPERATIONS_TOTAL: &str = "kv_operations_total";
pub const CONNECTIONS_TOTAL: &str = "kv_connections_total";
pub const MESSAGES_TOTAL: &str = "kv_pubsub_messages_total";
pub const OPERATION_DURATION: &str = "kv_operation_duration_ms";
pub const RECONNECTION_DURATION: &str = "kv_reconnection_duration_ms";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize export batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid export endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Endpoint returned non-success response: {0}")]
    Rejected(String),

    #[error("Export failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ExportError>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub histogram: HistogramSnapshot,
}

/// One export payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBatch {
    #[serde(flatten)]
    pub identity: RunIdentity,
    pub timestamp: DateTime<Utc>,
    pub interval_secs: f64,
    pub counters: Vec<CounterSample>,
    pub histograms: Vec<HistogramSample>,
}

fn labels<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl ExportBatch {
    /// Cumulative counters and histograms as of `snapshot`.
    pub fn from_snapshot(snapshot: &MetricsSnapshot, identity: &RunIdentity) -> Self {
        let mut counters = Vec::new();
        let mut histograms = Vec::new();

        for (name, op) in &snapshot.operations {
            counters.push(CounterSample {
                name: OPERATIONS_TOTAL.to_string(),
                labels: labels([("operation", name.as_str()), ("status", "success")]),
                value: op.success,
            });
            for (kind, count) in &op.errors_by_kind {
                counters.push(CounterSample {
                    name: OPERATIONS_TOTAL.to_string(),
                    labels: labels([
                        ("operation", name.as_str()),
                        ("status", "error"),
                        ("error_type", kind.as_str()),
                    ]),
                    value: *count,
                });
            }
            histograms.push(HistogramSample {
                name: OPERATION_DURATION.to_string(),
                labels: labels([("operation", name.as_str())]),
                histogram: op.histogram.clone(),
            });
        }

        let conn = &snapshot.connections;
        for (event, value) in [
            ("attempt", conn.attempts),
            ("failure", conn.failures),
            ("drop", conn.drops),
            ("reconnection", conn.reconnections),
            ("closed", conn.hard_failures),
        ] {
            counters.push(CounterSample {
                name: CONNECTIONS_TOTAL.to_string(),
                labels: labels([("event", event)]),
                value,
            });
        }
        histograms.push(HistogramSample {
            name: RECONNECTION_DURATION.to_string(),
            labels: BTreeMap::new(),
            histogram: conn.reconnection_histogram.clone(),
        });

        for (channel, c) in &snapshot.channels {
            counters.push(CounterSample {
                name: MESSAGES_TOTAL.to_string(),
                labels: labels([("channel", channel.as_str()), ("status", "received")]),
                value: c.received,
            });
            if c.errors > 0 {
                counters.push(CounterSample {
                    name: MESSAGES_TOTAL.to_string(),
                    labels: labels([("channel", channel.as_str()), ("status", "error")]),
                    value: c.errors,
                });
            }
        }

        Self {
            identity: identity.clone(),
            timestamp: snapshot.taken_at,
            interval_secs: snapshot.interval_secs,
            counters,
            histograms,
        }
    }

    /// Looks up a counter by name and an exact label set.
    pub fn counter(&self, name: &str, label_pairs: &[(&str, &str)]) -> Option<u64> {
        self.counters
            .iter()
            .find(|c| {
                c.name == name
                    && c.labels.len() == label_pairs.len()
                    && label_pairs
                        .iter()
                        .all(|(k, v)| c.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|c| c.value)
    }
}

/// Destination for periodic metric batches.
pub trait MetricsExporter: Send {
    fn name(&self) -> &str;

    fn export(&mut self, batch: &ExportBatch) -> Result<(), ExportError>;

    fn flush(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

/// POSTs each batch as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPushExporter {
    host: String,
    path: String,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
}

impl HttpPushExporter {
    /// Accepts `http://host:port/path` or `host:port`. The path defaults to
    /// `/metrics`.
    pub fn new(url: &str) -> Result<Self, ExportError> {
        if url.starts_with("https://") {
            return Err(ExportError::InvalidEndpoint(url.to_string()));
        }
        let trimmed = url.strip_prefix("http://").unwrap_or(url);
        let (host, path) = match trimmed.find('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
            None => (trimmed, "/metrics"),
        };
        if host.is_empty() || !host.contains(':') {
            return Err(ExportError::InvalidEndpoint(url.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            path: path.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.host, self.path)
    }

    fn try_post(&self, body: &str) -> Result<(), ExportError> {
        let mut stream = TcpStream::connect(&self.host)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let request = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.path,
            self.host,
            body.len(),
            body
        );
        stream.write_all(request.as_bytes())?;
        stream.flush()?;

        let mut response = String::new();
        stream.read_to_string(&mut response)?;

        let status_line = response.lines().next().unwrap_or("(no status line)");
        let accepted = status_line
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code.starts_with('2'));
        if !accepted {
            return Err(ExportError::Rejected(status_line.to_string()));
        }
        Ok(())
    }
}

impl MetricsExporter for HttpPushExporter {
    fn name(&self) -> &str {
        "http"
    }

    fn export(&mut self, batch: &ExportBatch) -> Result<(), ExportError> {
        let body = serde_json::to_string(batch)?;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.try_post(&body) {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!("Exported metrics to {} after {attempt} attempts", self.host);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(
                            "Failed to POST metrics to {} (attempt {}/{}): {}. Retrying in {:?}...",
                            self.host,
                            attempt,
                            self.max_retries,
                            e,
                            self.retry_delay
                        );
                        thread::sleep(self.retry_delay);
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(ExportError::RetriesExhausted {
                attempts: self.max_retries,
                last: Box::new(last),
            }),
            None => Ok(()),
        }
    }
}

/// Appends each batch as one JSON line to a file.
pub struct JsonLinesExporter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesExporter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsExporter for JsonLinesExporter {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn export(&mut self, batch: &ExportBatch) -> Result<(), ExportError> {
        serde_json::to_writer(&mut self.writer, batch)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}
