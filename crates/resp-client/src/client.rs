//! Request/response client over one stream.

use crate::resp::Value;
use crate::stream::Stream;
use loadgen_core::{ClientError, Command, ConnectionConfig, KvClient, NodeAddress, Reply};
use rustls::ClientConfig;
use std::sync::Arc;

/// An authenticated connection to one node.
pub struct RespClient {
    stream: Stream,
    node: NodeAddress,
    closed: bool,
}

impl RespClient {
    /// Connect to `node`, then run AUTH, SELECT and CLIENT SETNAME as configured.
    pub fn connect(
        node: &NodeAddress,
        config: &ConnectionConfig,
        tls_config: Option<&Arc<ClientConfig>>,
    ) -> Result<Self, ClientError> {
        let stream = Stream::open(node, config, tls_config)?;
        let mut client = Self {
            stream,
            node: node.clone(),
            closed: false,
        };
        if let Err(e) = client.handshake(config) {
            client.close();
            return Err(e);
        }
        tracing::debug!("Connected to {}", client.node);
        Ok(client)
    }

    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    fn handshake(&mut self, config: &ConnectionConfig) -> Result<(), ClientError> {
        if let Some(password) = &config.password {
            let mut auth = Command::new("AUTH");
            if let Some(username) = &config.username {
                auth = auth.arg(username);
            }
            self.expect_ok(&auth.arg(password))?;
        }

        if config.database != 0 && !config.cluster_mode {
            self.expect_ok(&Command::new("SELECT").arg_int(i64::from(config.database)))?;
        }

        if !config.client_name.is_empty() {
            let setname = Command::new("CLIENT")
                .arg("SETNAME")
                .arg(&config.client_name);
            match self.execute(&setname) {
                Ok(_) => {}
                // Some proxies reject CLIENT; the connection is still usable.
                Err(e) if !e.is_transport() => {
                    tracing::debug!("CLIENT SETNAME rejected by {}: {e}", self.node);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn expect_ok(&mut self, command: &Command) -> Result<(), ClientError> {
        let reply = self.execute(command)?;
        if reply.is_status("OK") {
            Ok(())
        } else {
            Err(ClientError::UnexpectedReply(format!(
                "{} returned {reply:?}",
                command.name()
            )))
        }
    }
}

impl KvClient for RespClient {
    fn ping(&mut self) -> Result<(), ClientError> {
        let reply = self.execute(&Command::new("PING"))?;
        if reply.is_status("PONG") {
            Ok(())
        } else {
            Err(ClientError::UnexpectedReply(format!("PING returned {reply:?}")))
        }
    }

    fn execute(&mut self, command: &Command) -> Result<Reply, ClientError> {
        self.stream.request(command)?.into_reply()
    }

    fn pipeline(
        &mut self,
        commands: &[Command],
    ) -> Result<Vec<Result<Reply, ClientError>>, ClientError> {
        self.stream.send(commands)?;
        let mut results = Vec::with_capacity(commands.len());
        for _ in commands {
            results.push(self.stream.receive()?.into_reply());
        }
        Ok(results)
    }

    fn transaction(&mut self, commands: &[Command]) -> Result<Vec<Reply>, ClientError> {
        let mut batch = Vec::with_capacity(commands.len() + 2);
        batch.push(Command::new("MULTI"));
        batch.extend_from_slice(commands);
        batch.push(Command::new("EXEC"));
        self.stream.send(&batch)?;

        // Every reply is drained before returning so the stream stays in sync.
        let mut first_error: Option<String> = None;
        for _ in 0..=commands.len() {
            if let Value::Error(message) = self.stream.receive()? {
                first_error.get_or_insert(message);
            }
        }

        match self.stream.receive()? {
            Value::Error(message) => Err(ClientError::TransactionAborted(
                first_error.unwrap_or(message),
            )),
            Value::Array(None) | Value::Bulk(None) => Err(ClientError::TransactionAborted(
                "EXEC returned nil".to_string(),
            )),
            Value::Array(Some(items)) => {
                if let Some(message) = first_error {
                    return Err(ClientError::TransactionAborted(message));
                }
                items
                    .into_iter()
                    .map(Value::into_reply)
                    .collect::<Result<Vec<_>, _>>()
            }
            other => Err(ClientError::UnexpectedReply(format!(
                "EXEC returned {other:?}"
            ))),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stream.shutdown();
        }
    }
}

impl Drop for RespClient {
    fn drop(&mut self) {
        self.close();
    }
}
