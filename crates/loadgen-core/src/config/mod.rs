//! Run configuration: connection settings, workload description and run plan.
//!
//! All three are built once before a run starts and never mutated afterwards.
//! Each type validates itself; the engine refuses to start with an invalid
//! configuration.

mod connection;
mod plan;
mod workload;

pub use connection::{ConnectionConfig, NodeAddress, TlsConfig};
pub use plan::RunPlan;
pub use workload::{ValueSize, WorkloadKind, WorkloadSpec};

use thiserror::Error;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid connection configuration: {0}")]
    Connection(String),

    #[error("Invalid workload configuration: {0}")]
    Workload(String),

    #[error("Invalid run plan: {0}")]
    Plan(String),
}

/// Serde helpers encoding [`std::time::Duration`] as fractional seconds.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&d.as_secs_f64()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            match Option::<f64>::deserialize(d)? {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
