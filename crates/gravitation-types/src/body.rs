//! Profiles and orbit bodies.

use serde::{Deserialize, Serialize};

/// Capability tags describing one peer. Compared as a multiset: order is
/// irrelevant, duplicates count.
pub type Profile = Vec<String>;

/// A peer recorded in an orbit, as it was known when it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Identifier of the recorded peer.
    pub peer_id: String,
    /// The peer's profile at recording time.
    pub profile: Profile,
}

impl Body {
    pub fn new(peer_id: impl Into<String>, profile: Profile) -> Self {
        Self {
            peer_id: peer_id.into(),
            profile,
        }
    }
}

/// Build a profile from string slices.
pub fn profile_of(tags: &[&str]) -> Profile {
    tags.iter().map(|t| t.to_string()).collect()
}
