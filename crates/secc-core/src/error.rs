//! Stream transport errors

use thiserror::Error;

/// Failures on the vehicle-facing stream connection.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("security negotiation failed: {0}")]
    Security(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
