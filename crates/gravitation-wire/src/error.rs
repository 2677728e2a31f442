//! Errors from the gravitation wire layer.

use thiserror::Error;

/// Errors from the gravitation wire layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),
    #[error("No handler for protocol {protocol} on {peer}")]
    NoHandler { peer: String, protocol: String },
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("No pending request for response {0}")]
    Correlation(String),
    #[error("Local profile is empty")]
    EmptyProfile,
    #[error("Request {id} timed out")]
    Timeout { id: String },
    #[error("Request {id} was cancelled")]
    Cancelled { id: String },
}

/// Alias for wire results.
pub type WireResult<T> = Result<T, WireError>;
