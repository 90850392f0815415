//! Error taxonomy for operations against the target store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Classification attached to every failed operation.
///
/// The serialized names are the labels used in reports and exported metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call did not complete within the socket timeout.
    Timeout,
    /// Connection refused, reset, DNS failure or a manager that is not ready.
    #[serde(rename = "connection_error")]
    Connection,
    /// The server rejected the command.
    #[serde(rename = "command_error")]
    Command,
    /// Authentication or authorization failed.
    #[serde(rename = "auth_error")]
    Auth,
    /// Routing or redirect failure in a sharded deployment.
    #[serde(rename = "cluster_error")]
    Cluster,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Timeout,
        ErrorKind::Connection,
        ErrorKind::Command,
        ErrorKind::Auth,
        ErrorKind::Cluster,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection_error",
            ErrorKind::Command => "command_error",
            ErrorKind::Auth => "auth_error",
            ErrorKind::Cluster => "cluster_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Classify an I/O error.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::AddrInUse => ErrorKind::Connection,
            io::ErrorKind::PermissionDenied => ErrorKind::Auth,
            _ => ErrorKind::Unknown,
        }
    }

    /// Classify a server error reply by its leading error code.
    pub fn from_server_message(message: &str) -> Self {
        let code = message.split_whitespace().next().unwrap_or_default();
        match code {
            "MOVED" | "ASK" | "CLUSTERDOWN" | "TRYAGAIN" | "CROSSSLOT" => ErrorKind::Cluster,
            "NOAUTH" | "WRONGPASS" | "NOPERM" => ErrorKind::Auth,
            _ if message.contains("invalid password") => ErrorKind::Auth,
            _ => ErrorKind::Command,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a [`KvClient`](crate::KvClient) implementation.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket level failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Host name could not be resolved.
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// The server answered with an error reply.
    #[error("Server error ({kind}): {message}")]
    Server { kind: ErrorKind, message: String },

    /// The byte stream did not follow the wire protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A transaction was discarded by the server.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// The reply had an unexpected shape.
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl ClientError {
    /// Build a server error, classifying it by its error code.
    pub fn server(message: impl Into<String>) -> Self {
        let message = message.into();
        ClientError::Server {
            kind: ErrorKind::from_server_message(&message),
            message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Io(e) => ErrorKind::from_io(e),
            ClientError::Resolve(_) => ErrorKind::Connection,
            ClientError::Server { kind, .. } => *kind,
            ClientError::Protocol(_) => ErrorKind::Unknown,
            ClientError::Tls(_) => ErrorKind::Connection,
            ClientError::TransactionAborted(_) => ErrorKind::Command,
            ClientError::UnexpectedReply(_) => ErrorKind::Command,
        }
    }

    /// Whether the connection must be considered broken after this error.
    ///
    /// Server replies leave the stream in a consistent state. Everything that
    /// happens below the reply level does not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Resolve(_)
                | ClientError::Protocol(_)
                | ClientError::Tls(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_classification() {
        assert_eq!(
            ErrorKind::from_server_message("MOVED 3999 127.0.0.1:6381"),
            ErrorKind::Cluster
        );
        assert_eq!(
            ErrorKind::from_server_message("CLUSTERDOWN The cluster is down"),
            ErrorKind::Cluster
        );
        assert_eq!(
            ErrorKind::from_server_message("WRONGPASS invalid username-password pair"),
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorKind::from_server_message("NOAUTH Authentication required."),
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorKind::from_server_message(
                "WRONGTYPE Operation against a key holding the wrong kind of value"
            ),
            ErrorKind::Command
        );
        assert_eq!(
            ErrorKind::from_server_message("ERR unknown command 'FOO'"),
            ErrorKind::Command
        );
    }

    #[test]
    fn test_io_classification() {
        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        let would_block = io::Error::from(io::ErrorKind::WouldBlock);
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(ErrorKind::from_io(&timeout), ErrorKind::Timeout);
        assert_eq!(ErrorKind::from_io(&would_block), ErrorKind::Timeout);
        assert_eq!(ErrorKind::from_io(&refused), ErrorKind::Connection);
        assert_eq!(ErrorKind::from_io(&eof), ErrorKind::Connection);
    }

    #[test]
    fn test_transport_errors() {
        let io_err = ClientError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(io_err.is_transport());
        assert_eq!(io_err.kind(), ErrorKind::Connection);

        let server_err = ClientError::server("ERR value is not an integer");
        assert!(!server_err.is_transport());
        assert_eq!(server_err.kind(), ErrorKind::Command);

        assert!(ClientError::Protocol("bad prefix".into()).is_transport());
        assert!(ClientError::Resolve("nowhere:6379".into()).is_transport());
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ErrorKind::Connection.to_string(), "connection_error");
        assert_eq!(
            serde_json::to_string(&ErrorKind::Cluster).unwrap(),
            "\"cluster_error\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
