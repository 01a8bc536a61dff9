//! Client error types.

use crate::config::ConfigError;
use thiserror::Error;
use vndb_protocol::{ArgumentError, ErrorDetail, ProtocolError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    Argument(#[from] ArgumentError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server error: {0}")]
    Server(ErrorDetail),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect timeout")]
    Timeout,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether this error is retryable on a new connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::Server(detail) => detail.id == "throttled",
            _ => false,
        }
    }

    /// Returns the server's error detail for `error` replies.
    pub fn server_detail(&self) -> Option<&ErrorDetail> {
        match self {
            ClientError::Server(detail) => Some(detail),
            _ => None,
        }
    }
}
