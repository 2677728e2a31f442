//! Node configuration.
//!
//! Every field has a default, so a partial `config.toml` (or none at all)
//! yields a runnable node.

use crate::body::{Body, Profile};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration for a gravitation node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GravitationConfig {
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
    /// TCP address the node listens on.
    pub listen_addr: String,
    /// Local profile advertised to peers.
    pub profile: Profile,
    /// Orbit the node starts with.
    pub orbit: Vec<Body>,
    /// Known peer addresses.
    pub peers: Vec<PeerAddress>,
    /// Identity / signing settings.
    pub identity: IdentityConfig,
    /// Acceptance policy settings.
    pub policy: PolicyConfig,
    /// How accepted peers are recorded in the orbit.
    pub orbit_mode: OrbitMode,
    /// Seconds a sent request waits for its response before it is expired.
    pub request_timeout_secs: u64,
    /// Seconds between sweeps of expired pending requests.
    pub sweep_interval_secs: u64,
}

impl Default for GravitationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            profile: Vec::new(),
            orbit: Vec::new(),
            peers: Vec::new(),
            identity: IdentityConfig::default(),
            policy: PolicyConfig::default(),
            orbit_mode: OrbitMode::default(),
            request_timeout_secs: 30,
            sweep_interval_secs: 5,
        }
    }
}

impl GravitationConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        self.listen_socket_addr()?;

        for peer in &self.peers {
            peer.socket_addr()?;
        }

        match self.identity.kind {
            IdentityKind::SharedSecret if self.identity.shared_secret.is_empty() => {
                return Err(ConfigError::MissingSharedSecret);
            }
            IdentityKind::Ed25519 => {
                if let Some(ref key) = self.identity.signing_key {
                    self.identity.decode_signing_key(key)?;
                }
            }
            _ => {}
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "request_timeout_secs",
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "sweep_interval_secs",
            });
        }
        Ok(())
    }

    pub fn listen_socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// A statically configured peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerAddress {
    pub peer_id: String,
    pub address: String,
}

impl PeerAddress {
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.address
            .parse()
            .map_err(|_| ConfigError::InvalidPeerAddress {
                peer_id: self.peer_id.clone(),
                address: self.address.clone(),
            })
    }
}

/// Which signing scheme authenticates messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Per-node Ed25519 key; peer id derived from the public key.
    #[default]
    Ed25519,
    /// HMAC-SHA256 with a key shared by every node in the mesh.
    SharedSecret,
}

/// Identity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub kind: IdentityKind,
    /// Hex-encoded 32-byte Ed25519 seed. A fresh key is generated when unset.
    pub signing_key: Option<String>,
    /// Pre-shared key for the `shared_secret` identity.
    pub shared_secret: String,
    /// Node id for the `shared_secret` identity. Random when unset.
    pub node_id: Option<String>,
}

impl IdentityConfig {
    /// Decode a hex seed into its 32 raw bytes.
    pub fn decode_signing_key(&self, key: &str) -> ConfigResult<[u8; 32]> {
        let bytes =
            hex::decode(key.trim()).map_err(|e| ConfigError::InvalidSigningKey(e.to_string()))?;
        bytes.as_slice().try_into().map_err(|_| {
            ConfigError::InvalidSigningKey(format!("expected 32 bytes, got {}", bytes.len()))
        })
    }
}

/// Built-in acceptance policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Profiles must be equal as multisets.
    #[default]
    Multiset,
    /// Every local tag must appear in the remote profile.
    Subset,
    /// At least `min_shared` tags in common.
    Overlap,
    /// Accept every authenticated peer.
    AcceptAll,
}

/// Acceptance policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Minimum shared tags for the `overlap` policy.
    pub min_shared: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Multiset,
            min_shared: 1,
        }
    }
}

/// How an accepted peer is written into the orbit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitMode {
    /// Always append a new body; repeat exchanges record the peer again.
    #[default]
    Append,
    /// Replace the body already recorded for the peer, appending if absent.
    Upsert,
}
