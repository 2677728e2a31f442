//! Gravitation protocol — profile and orbit exchange between peers.
//!
//! Two peers trade their profile (a multiset of capability tags) and their
//! orbit (the peers they have already gravitated with). An acceptance policy
//! decides whether the counterpart is recorded in the local orbit.
//!
//! ## Architecture
//!
//! - **GravitationProtocol**: the engine; registers the request/response
//!   handlers and drives both sides of the exchange
//! - **AcceptancePolicy**: pluggable predicate deciding orbit membership
//! - **PendingRequests**: in-flight requests with per-request completion and
//!   deadlines
//! - **Orbit**: lock-protected record of accepted peers
//! - **Transport** / **Identity**: stream and signing collaborators, with
//!   in-memory, TCP, Ed25519 and shared-secret implementations

pub mod engine;
pub mod error;
pub mod identity;
pub mod memory;
pub mod message;
pub mod orbit;
pub mod pending;
pub mod policy;
pub mod tcp;
pub mod transport;

pub use engine::{GravitationProtocol, ProtocolConfig, REQUEST_PROTOCOL, RESPONSE_PROTOCOL};
pub use error::{WireError, WireResult};
pub use identity::{Ed25519Identity, Identity, SharedSecretIdentity};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use message::{GravitationRequest, GravitationResponse, MessageEnvelope, SubOrbitEntry};
pub use orbit::Orbit;
pub use pending::{PendingGravitation, PendingRequests};
pub use policy::{policy_from_config, AcceptancePolicy, MultisetMatch};
pub use tcp::TcpTransport;
pub use transport::{PeerStream, StreamHandler, Transport};
