//! Configuration error types.

use thiserror::Error;

/// Errors raised while validating a [`crate::GravitationConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The shared-secret identity was selected without a secret.
    #[error("identity.shared_secret must be set when identity.kind = \"shared_secret\"")]
    MissingSharedSecret,

    /// The configured Ed25519 seed is not 32 hex-encoded bytes.
    #[error("invalid identity.signing_key: {0}")]
    InvalidSigningKey(String),

    /// A duration field was set to zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A peer address entry could not be parsed.
    #[error("invalid peer address '{address}' for {peer_id}")]
    InvalidPeerAddress {
        /// Peer the address belongs to.
        peer_id: String,
        /// The raw address.
        address: String,
    },

    /// The listen address could not be parsed.
    #[error("invalid listen_addr '{0}'")]
    InvalidListenAddr(String),
}

/// Alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
