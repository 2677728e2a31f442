//! Wire protocol message types.
//!
//! Messages are MessagePack maps (named fields, so peers tolerate field
//! reordering) framed on the stream by a 4-byte big-endian length header.

use crate::error::{WireError, WireResult};
use gravitation_types::{Body, Profile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Maximum single frame size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Client version stamped into every envelope.
pub const CLIENT_VERSION: &str = concat!("gravitation/", env!("CARGO_PKG_VERSION"));

/// One orbit member as carried on the wire.
pub type SubOrbitEntry = Body;

/// Metadata common to every message: correlation id and sender identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Exchange identifier. A response reuses its request's id.
    pub id: String,
    /// Whether the message is meant to be relayed.
    pub gossip: bool,
    /// Peer id of the sender.
    pub node_id: String,
    /// Sender's public key bytes (empty for shared-secret identities).
    pub sender_identity: Vec<u8>,
    /// Unix seconds at envelope creation.
    pub timestamp: i64,
    pub client_version: String,
    /// Signature over the message encoded with this field empty.
    pub signature: Vec<u8>,
}

/// Sent by the initiator of a gravitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GravitationRequest {
    pub envelope: MessageEnvelope,
    pub profile: Profile,
    pub sub_orbit: Vec<SubOrbitEntry>,
}

/// Sent back by the responder over a fresh stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GravitationResponse {
    pub envelope: MessageEnvelope,
    pub profile: Profile,
    pub sub_orbit: Vec<SubOrbitEntry>,
}

/// First frame on every TCP connection: which protocol the stream speaks and
/// who opened it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHello {
    pub protocol: String,
    pub peer_id: String,
    /// Address the opener accepts connections on, if any.
    pub listen_addr: Option<String>,
}

/// A message that carries a signed envelope.
pub trait SignedMessage: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn envelope(&self) -> &MessageEnvelope;
    fn envelope_mut(&mut self) -> &mut MessageEnvelope;
    fn profile(&self) -> &[String];

    /// Bytes covered by the signature: the message with its signature cleared.
    fn signable_bytes(&self) -> WireResult<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.envelope_mut().signature.clear();
        encode(&unsigned)
    }

    fn is_signed(&self) -> bool {
        !self.envelope().signature.is_empty()
    }
}

impl SignedMessage for GravitationRequest {
    fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }
    fn envelope_mut(&mut self) -> &mut MessageEnvelope {
        &mut self.envelope
    }
    fn profile(&self) -> &[String] {
        &self.profile
    }
}

impl SignedMessage for GravitationResponse {
    fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }
    fn envelope_mut(&mut self) -> &mut MessageEnvelope {
        &mut self.envelope
    }
    fn profile(&self) -> &[String] {
        &self.profile
    }
}

/// Encode a message body (no length header).
pub fn encode<T: Serialize>(msg: &T) -> WireResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(msg)?)
}

/// Decode a message body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> WireResult<T> {
    Ok(rmp_serde::from_slice(body)?)
}

/// Prefix a body with its 4-byte big-endian length.
pub fn frame(body: &[u8]) -> WireResult<Vec<u8>> {
    if body.len() > MAX_MESSAGE_SIZE as usize {
        return Err(WireError::MessageTooLarge {
            size: body.len().min(u32::MAX as usize) as u32,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(body);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravitation_types::body::profile_of;

    fn request() -> GravitationRequest {
        GravitationRequest {
            envelope: MessageEnvelope {
                id: "req-1".to_string(),
                node_id: "node-a".to_string(),
                signature: vec![1, 2, 3],
                ..Default::default()
            },
            profile: profile_of(&["x", "y"]),
            sub_orbit: vec![Body::new("B1", profile_of(&["y", "x"]))],
        }
    }

    #[test]
    fn test_frame_header_matches_body() {
        let body = encode(&request()).unwrap();
        let bytes = frame(&body).unwrap();
        let len = decode_length(&[bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);
        let decoded: GravitationRequest = decode(&bytes[4..]).unwrap();
        assert_eq!(decoded, request());
    }

    #[test]
    fn test_signable_bytes_ignore_signature() {
        let signed = request();
        let mut resigned = request();
        resigned.envelope.signature = vec![9; 64];
        assert_eq!(
            signed.signable_bytes().unwrap(),
            resigned.signable_bytes().unwrap()
        );
        // The original is untouched.
        assert_eq!(signed.envelope.signature, vec![1, 2, 3]);
    }

    #[test]
    fn test_signable_bytes_cover_profile() {
        let a = request();
        let mut b = request();
        b.profile.push("z".to_string());
        assert_ne!(a.signable_bytes().unwrap(), b.signable_bytes().unwrap());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: WireResult<GravitationRequest> = decode(&[0xc1, 0x00, 0xff]);
        assert!(matches!(result, Err(WireError::Decode(_))));
    }

    #[test]
    fn test_request_is_not_a_hello() {
        let body = encode(&request()).unwrap();
        let result: WireResult<StreamHello> = decode(&body);
        assert!(result.is_err());
    }

    #[test]
    fn test_unsigned_detection() {
        let mut req = request();
        assert!(req.is_signed());
        req.envelope.signature.clear();
        assert!(!req.is_signed());
    }
}
