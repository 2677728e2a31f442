//! Message signing and authentication.
//!
//! An [`Identity`] stamps outbound envelopes with the local peer's metadata,
//! signs the encoded message, and verifies inbound envelopes. Two schemes
//! are provided:
//!
//! - [`Ed25519Identity`]: per-node key pair. The peer id is the hex SHA-256
//!   of the public key, so a verifier can check that the key in the envelope
//!   really belongs to the claimed `node_id`.
//! - [`SharedSecretIdentity`]: HMAC-SHA256 with a key shared by the mesh.

use crate::error::{WireError, WireResult};
use crate::message::{MessageEnvelope, CLIENT_VERSION};

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Signing collaborator consumed by the engine.
#[async_trait]
pub trait Identity: Send + Sync + 'static {
    /// Peer id messages are sent under.
    fn local_id(&self) -> &str;

    /// Fresh unsigned envelope for message `id`.
    fn build_envelope(&self, id: &str, gossip: bool) -> MessageEnvelope {
        MessageEnvelope {
            id: id.to_string(),
            gossip,
            node_id: self.local_id().to_string(),
            sender_identity: self.public_identity(),
            timestamp: chrono::Utc::now().timestamp(),
            client_version: CLIENT_VERSION.to_string(),
            signature: Vec::new(),
        }
    }

    /// Bytes published in `sender_identity`.
    fn public_identity(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Sign the signable encoding of a message.
    async fn sign(&self, payload: &[u8]) -> WireResult<Vec<u8>>;

    /// Check `envelope.signature` over `payload` and the sender metadata.
    fn authenticate(&self, payload: &[u8], envelope: &MessageEnvelope) -> bool;
}

/// Derive the peer id for an Ed25519 public key.
pub fn peer_id_for_key(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Ed25519 key-pair identity.
pub struct Ed25519Identity {
    signing_key: SigningKey,
    peer_id: String,
}

impl Ed25519Identity {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Rebuild an identity from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let peer_id = peer_id_for_key(&signing_key.verifying_key());
        Self {
            signing_key,
            peer_id,
        }
    }

    /// Hex-encoded seed, suitable for `identity.signing_key` in config.
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

#[async_trait]
impl Identity for Ed25519Identity {
    fn local_id(&self) -> &str {
        &self.peer_id
    }

    fn public_identity(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    async fn sign(&self, payload: &[u8]) -> WireResult<Vec<u8>> {
        Ok(self.signing_key.sign(payload).to_bytes().to_vec())
    }

    fn authenticate(&self, payload: &[u8], envelope: &MessageEnvelope) -> bool {
        match verify_ed25519(payload, envelope) {
            Ok(()) => true,
            Err(reason) => {
                debug!(id = %envelope.id, node = %envelope.node_id, %reason, "ed25519 verification failed");
                false
            }
        }
    }
}

fn verify_ed25519(payload: &[u8], envelope: &MessageEnvelope) -> Result<(), String> {
    let pk_bytes: [u8; 32] = envelope
        .sender_identity
        .as_slice()
        .try_into()
        .map_err(|_| "invalid public key length (expected 32 bytes)".to_string())?;
    let verifying_key =
        VerifyingKey::from_bytes(&pk_bytes).map_err(|e| format!("invalid public key: {e}"))?;

    if peer_id_for_key(&verifying_key) != envelope.node_id {
        return Err("public key does not match node id".to_string());
    }

    let sig_bytes: [u8; 64] = envelope
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| "invalid signature length (expected 64 bytes)".to_string())?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(payload, &signature)
        .map_err(|e| format!("signature verification failed: {e}"))
}

/// Pre-shared-key identity. Every node holding the secret can vouch for any
/// node id, so this only authenticates membership in the mesh.
pub struct SharedSecretIdentity {
    peer_id: String,
    secret: String,
}

impl SharedSecretIdentity {
    pub fn new(peer_id: impl Into<String>, secret: impl Into<String>) -> WireResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(WireError::Signing("shared secret must not be empty".into()));
        }
        Ok(Self {
            peer_id: peer_id.into(),
            secret,
        })
    }

    fn mac(&self, payload: &[u8]) -> WireResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| WireError::Signing(e.to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[async_trait]
impl Identity for SharedSecretIdentity {
    fn local_id(&self) -> &str {
        &self.peer_id
    }

    async fn sign(&self, payload: &[u8]) -> WireResult<Vec<u8>> {
        self.mac(payload)
    }

    fn authenticate(&self, payload: &[u8], envelope: &MessageEnvelope) -> bool {
        let Ok(expected) = self.mac(payload) else {
            return false;
        };
        if expected.len() != envelope.signature.len() {
            return false;
        }
        subtle::ConstantTimeEq::ct_eq(expected.as_slice(), envelope.signature.as_slice()).into()
    }
}
