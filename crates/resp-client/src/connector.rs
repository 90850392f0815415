//! Connection factory bound to one [`ConnectionConfig`].

use crate::client::RespClient;
use crate::subscription::RespSubscription;
use crate::tls;
use loadgen_core::{ClientError, ConnectionConfig, Connector, NodeAddress, Subscription};
use rustls::ClientConfig;
use std::sync::Arc;

/// Builds clients for every manager of a run.
///
/// In cluster mode each manager is pinned to one seed node by position, which
/// spreads connections across the cluster. Keys owned by another node come
/// back as `MOVED` and are recorded as cluster errors.
pub struct RespConnector {
    config: Arc<ConnectionConfig>,
    nodes: Vec<NodeAddress>,
    tls_config: Option<Arc<ClientConfig>>,
}

impl RespConnector {
    pub fn new(config: ConnectionConfig) -> Result<Self, ClientError> {
        let tls_config = if config.tls.enabled {
            Some(tls::client_config(&config.tls)?)
        } else {
            None
        };
        let nodes = config.nodes();
        Ok(Self {
            config: Arc::new(config),
            nodes,
            tls_config,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn node(&self, index: usize) -> &NodeAddress {
        &self.nodes[index % self.nodes.len()]
    }
}

impl Connector for RespConnector {
    type Client = RespClient;

    fn connect(&self, node: usize) -> Result<RespClient, ClientError> {
        RespClient::connect(self.node(node), &self.config, self.tls_config.as_ref())
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>, ClientError> {
        let subscription =
            RespSubscription::open(self.node(0), &self.config, self.tls_config.as_ref(), channels)?;
        Ok(Box::new(subscription))
    }

    fn describe(&self) -> String {
        self.config.describe()
    }
}
