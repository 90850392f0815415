//! Dedicated subscriber connection.

use crate::resp::Value;
use crate::stream::Stream;
use loadgen_core::{ClientError, Command, ConnectionConfig, Message, NodeAddress, Subscription};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;

/// A connection in subscriber mode. Only push messages are read from it.
pub struct RespSubscription {
    stream: Stream,
    channels: Vec<String>,
    /// Bound on reading the rest of a frame once its first byte arrived.
    frame_timeout: Duration,
    closed: bool,
}

impl RespSubscription {
    pub fn open(
        node: &NodeAddress,
        config: &ConnectionConfig,
        tls_config: Option<&Arc<ClientConfig>>,
        channels: &[String],
    ) -> Result<Self, ClientError> {
        let mut stream = Stream::open(node, config, tls_config)?;

        if let Some(password) = &config.password {
            let mut auth = Command::new("AUTH");
            if let Some(username) = &config.username {
                auth = auth.arg(username);
            }
            stream.request(&auth.arg(password))?.into_reply()?;
        }

        let mut subscribe = Command::new("SUBSCRIBE");
        for channel in channels {
            subscribe = subscribe.arg(channel);
        }
        stream.send(std::slice::from_ref(&subscribe))?;
        // One confirmation per channel.
        for _ in channels {
            match stream.receive()? {
                Value::Error(message) => return Err(ClientError::server(message)),
                Value::Array(Some(_)) => {}
                other => {
                    return Err(ClientError::UnexpectedReply(format!(
                        "SUBSCRIBE returned {other:?}"
                    )))
                }
            }
        }
        tracing::debug!("Subscribed to {} channel(s) on {node}", channels.len());

        Ok(Self {
            stream,
            channels: channels.to_vec(),
            frame_timeout: config.socket_timeout,
            closed: false,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

fn bulk_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Bulk(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Simple(s) => Some(s.clone()),
        _ => None,
    }
}

impl Subscription for RespSubscription {
    fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, ClientError> {
        if !self.stream.wait_readable(timeout)? {
            return Ok(None);
        }
        self.stream.set_read_timeout(self.frame_timeout)?;
        let value = self.stream.receive()?;

        match value {
            Value::Array(Some(items)) if items.len() == 3 => {
                let kind = bulk_to_string(&items[0]).unwrap_or_default();
                if !kind.eq_ignore_ascii_case("message") {
                    return Ok(None);
                }
                let channel = bulk_to_string(&items[1]).unwrap_or_default();
                let payload = match &items[2] {
                    Value::Bulk(Some(b)) => b.clone(),
                    _ => Vec::new(),
                };
                Ok(Some(Message { channel, payload }))
            }
            Value::Error(message) => Err(ClientError::server(message)),
            _ => Ok(None),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stream.shutdown();
        }
    }
}

impl Drop for RespSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
