use crate::connection::ConnectionState;
use loadgen_core::{ClientError, ConfigError, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Failure of one operation attempted through a connection manager.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Connection not ready ({state}), retry in {retry_in:?}")]
    NotReady {
        state: ConnectionState,
        retry_in: Duration,
    },

    #[error("Connection closed")]
    Closed,

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ExecError {
    /// Classification recorded in the operation outcome.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::NotReady { .. } | ExecError::Closed => ErrorKind::Connection,
            ExecError::Client(e) => e.kind(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool exhausted: no connection available within {0:?}")]
    Exhausted(Duration),

    #[error("Pool closed")]
    Closed,

    #[error("Every connection in the pool is closed")]
    AllConnectionsClosed,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create connector: {0}")]
    Client(#[from] ClientError),

    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
