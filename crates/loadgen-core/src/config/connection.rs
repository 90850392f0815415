use super::{secs, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Address of one server node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid node address '{s}': expected host:port"))?;
        if host.is_empty() {
            return Err(format!("Invalid node address '{s}': empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("Invalid port in node address '{s}': {e}"))?;
        Ok(NodeAddress::new(host, port))
    }
}

/// TLS options handed to the client unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Verify the server certificate chain and host name.
    pub verify_peer: bool,
    /// PEM bundle of trusted CA certificates. Platform roots are used if unset.
    pub ca_certs: Option<PathBuf>,
    /// PEM client certificate for mutual TLS.
    pub cert_file: Option<PathBuf>,
    /// PEM private key matching `cert_file`.
    pub key_file: Option<PathBuf>,
    /// Overrides the name used for SNI and certificate verification.
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verify_peer: true,
            ca_certs: None,
            cert_file: None,
            key_file: None,
            server_name: None,
        }
    }
}

/// Connection settings for every manager in every pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub client_name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub cluster_mode: bool,
    pub cluster_nodes: Vec<NodeAddress>,
    pub tls: TlsConfig,
    #[serde(with = "secs")]
    pub socket_timeout: Duration,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Upper bound on connections held by one pool.
    pub max_connections: usize,
    /// Consecutive failed connection attempts after which a manager gives up.
    pub retry_attempts: u32,
    #[serde(with = "secs")]
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "secs")]
    pub backoff_max: Duration,
    /// Idle time after which a connection is pinged before use. Zero disables.
    #[serde(with = "secs")]
    pub health_check_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_name: "kv-loadgen".to_string(),
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            cluster_mode: false,
            cluster_nodes: Vec::new(),
            tls: TlsConfig::default(),
            socket_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            max_connections: 50,
            retry_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_auth(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_cluster_nodes(mut self, nodes: Vec<NodeAddress>) -> Self {
        self.cluster_mode = true;
        self.cluster_nodes = nodes;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, socket: Duration) -> Self {
        self.connect_timeout = connect;
        self.socket_timeout = socket;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_multiplier = multiplier;
        self.backoff_max = max;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Nodes to connect to: the cluster seed list in cluster mode, otherwise
    /// the single configured host.
    pub fn nodes(&self) -> Vec<NodeAddress> {
        if self.cluster_mode && !self.cluster_nodes.is_empty() {
            self.cluster_nodes.clone()
        } else {
            vec![NodeAddress::new(self.host.clone(), self.port)]
        }
    }

    /// Target description with credentials masked.
    pub fn describe(&self) -> String {
        let scheme = if self.tls.enabled { "rediss" } else { "redis" };
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{user}:***@"),
            (None, Some(_)) => ":***@".to_string(),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        let nodes = self
            .nodes()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if self.cluster_mode {
            format!("{scheme}://{auth}{nodes} (cluster)")
        } else {
            format!("{scheme}://{auth}{nodes}/{}", self.database)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes().iter().any(|n| n.host.trim().is_empty()) {
            return Err(ConfigError::Connection("host must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Connection(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Connection(
                "retry_attempts must be greater than 0".into(),
            ));
        }
        if self.backoff_base.is_zero() || self.backoff_max < self.backoff_base {
            return Err(ConfigError::Connection(format!(
                "backoff_base ({:?}) must be non-zero and not exceed backoff_max ({:?})",
                self.backoff_base, self.backoff_max
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Connection(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.socket_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::Connection(
                "socket and connect timeouts must be non-zero".into(),
            ));
        }
        if self.tls.cert_file.is_some() != self.tls.key_file.is_some() {
            return Err(ConfigError::Connection(
                "TLS client certificate and key must be given together".into(),
            ));
        }
        Ok(())
    }
}
