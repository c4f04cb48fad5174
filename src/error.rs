//! Top-level error type for constructing and running the query server.

use thiserror::Error;

use crate::config::{ConfigError, ValidationError};
use crate::net::tls::TlsError;
use crate::net::topology::TopologyError;

/// Errors returned by [`crate::lifecycle::Server`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("failed to bind {endpoint} endpoint on {addr}: {source}")]
    Bind {
        endpoint: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server already started")]
    AlreadyStarted,

    #[error("server is closed")]
    Closed,

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<Vec<ValidationError>> for ServerError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ServerError::Config(ConfigError::Validation(errors))
    }
}
