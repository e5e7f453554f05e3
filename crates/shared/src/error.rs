//! Shared error types.

use thiserror::Error;

/// Failure to construct a transport connection.
///
/// These never escape the connection manager; they are reported through its
/// error callback and the `Error` connection state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("Failed to open connection: {0}")]
    Open(String),
}

impl TransportError {
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }
}

/// An inbound frame that could not be decoded.
#[derive(Error, Debug)]
#[error("Malformed message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);
