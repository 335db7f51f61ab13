//! Error types for the transport boundary, the supervisor and configuration.

use thiserror::Error;

use super::endpoints::Endpoint;

/// Errors raised by a transport or one of its handles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached or the handshake failed.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// An operation did not complete in time.
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// The connection is gone.
    #[error("connection closed")]
    Disconnected,

    /// The remote node answered with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The remote node sent something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn connect(endpoint: &Endpoint, reason: impl ToString) -> Self {
        TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        TransportError::Timeout {
            operation: operation.into(),
        }
    }
}

/// Errors surfaced by the connection supervisor.
///
/// Only the initial connection failure is fatal; losses after that are
/// recovered internally and never reach callers.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No endpoint in the pool accepted the first connection.
    #[error("initial connection failed after {attempted} endpoint(s), last tried {endpoint}: {source}")]
    InitialConnection {
        endpoint: Endpoint,
        attempted: usize,
        #[source]
        source: TransportError,
    },

    /// The supervisor configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A bounded wait for a connection expired.
    #[error("no connection available within {0:?}")]
    Timeout(std::time::Duration),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("endpoint list is empty")]
    EmptyEndpointList,

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failover width must be at least 1, got {0}")]
    InvalidFailoverWidth(usize),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
