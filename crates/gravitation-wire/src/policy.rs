//! Acceptance policies — whether a remote peer joins the local orbit.
//!
//! Policies are pure: they see the local profile, the current orbit and the
//! remote message, and return a verdict. The engine evaluates them while it
//! holds the orbit lock, so a policy must not block.

use crate::message::{GravitationRequest, GravitationResponse};
use gravitation_types::config::{PolicyConfig, PolicyKind};
use gravitation_types::Body;
use std::collections::HashMap;
use std::sync::Arc;

/// Decides whether the sender of a request or response is added to the orbit.
pub trait AcceptancePolicy: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Core predicate over the two profiles.
    fn admits(&self, local_profile: &[String], orbit: &[Body], remote_profile: &[String]) -> bool;

    /// Verdict for an inbound request (responder side).
    fn evaluate_request(
        &self,
        local_profile: &[String],
        orbit: &[Body],
        request: &GravitationRequest,
    ) -> bool {
        self.admits(local_profile, orbit, &request.profile)
    }

    /// Verdict for an inbound response (initiator side).
    fn evaluate_response(
        &self,
        local_profile: &[String],
        orbit: &[Body],
        response: &GravitationResponse,
    ) -> bool {
        self.admits(local_profile, orbit, &response.profile)
    }
}

/// True when both profiles hold the same tags with the same multiplicities.
pub fn multiset_eq(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&str> = a.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = b.iter().map(String::as_str).collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

fn tag_counts(profile: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for tag in profile {
        *counts.entry(tag.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Size of the multiset intersection of two profiles.
pub fn shared_tags(a: &[String], b: &[String]) -> usize {
    let b_counts = tag_counts(b);
    tag_counts(a)
        .into_iter()
        .map(|(tag, n)| n.min(b_counts.get(tag).copied().unwrap_or(0)))
        .sum()
}

/// Default policy: profiles must be equal as multisets.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultisetMatch;

impl AcceptancePolicy for MultisetMatch {
    fn name(&self) -> &'static str {
        "multiset"
    }

    fn admits(&self, local_profile: &[String], _orbit: &[Body], remote_profile: &[String]) -> bool {
        multiset_eq(local_profile, remote_profile)
    }
}

/// The remote profile must contain every local tag, counting duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetMatch;

impl AcceptancePolicy for SubsetMatch {
    fn name(&self) -> &'static str {
        "subset"
    }

    fn admits(&self, local_profile: &[String], _orbit: &[Body], remote_profile: &[String]) -> bool {
        shared_tags(local_profile, remote_profile) == local_profile.len()
    }
}

/// At least `min_shared` tags in common.
#[derive(Debug, Clone, Copy)]
pub struct OverlapThreshold {
    pub min_shared: usize,
}

impl AcceptancePolicy for OverlapThreshold {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn admits(&self, local_profile: &[String], _orbit: &[Body], remote_profile: &[String]) -> bool {
        shared_tags(local_profile, remote_profile) >= self.min_shared
    }
}

/// Admit every authenticated peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptancePolicy for AcceptAll {
    fn name(&self) -> &'static str {
        "accept_all"
    }

    fn admits(&self, _: &[String], _: &[Body], _: &[String]) -> bool {
        true
    }
}

/// Build the configured policy.
pub fn policy_from_config(config: &PolicyConfig) -> Arc<dyn AcceptancePolicy> {
    match config.kind {
        PolicyKind::Multiset => Arc::new(MultisetMatch),
        PolicyKind::Subset => Arc::new(SubsetMatch),
        PolicyKind::Overlap => Arc::new(OverlapThreshold {
            min_shared: config.min_shared,
        }),
        PolicyKind::AcceptAll => Arc::new(AcceptAll),
    }
}
