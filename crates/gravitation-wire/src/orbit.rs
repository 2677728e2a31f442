//! Orbit — the local record of peers this node has gravitated with.
//!
//! The [`Orbit`] is shared between the responder and correlation handlers,
//! which run concurrently. Admission decisions read the orbit and append to
//! it under a single write lock so two handlers never decide on the same
//! snapshot.

use gravitation_types::config::OrbitMode;
use gravitation_types::Body;
use std::sync::{Arc, RwLock};

/// Result of [`Orbit::admit`].
#[derive(Debug, Clone)]
pub struct Admission {
    /// Whether the candidate was recorded.
    pub accepted: bool,
    /// The orbit right after the decision.
    pub snapshot: Vec<Body>,
}

/// Thread-safe, ordered collection of [`Body`] records.
#[derive(Debug, Clone)]
pub struct Orbit {
    bodies: Arc<RwLock<Vec<Body>>>,
    mode: OrbitMode,
}

impl Orbit {
    pub fn new(initial: Vec<Body>, mode: OrbitMode) -> Self {
        Self {
            bodies: Arc::new(RwLock::new(initial)),
            mode,
        }
    }

    pub fn mode(&self) -> OrbitMode {
        self.mode
    }

    /// Ask `decide` about `candidate` and record it when it says yes.
    ///
    /// `decide` sees the orbit as it is before the candidate is recorded.
    pub fn admit<F>(&self, candidate: Body, decide: F) -> Admission
    where
        F: FnOnce(&[Body]) -> bool,
    {
        let mut bodies = self.bodies.write().unwrap_or_else(|e| e.into_inner());
        let accepted = decide(&bodies);
        if accepted {
            Self::record(&mut bodies, candidate, self.mode);
        }
        Admission {
            accepted,
            snapshot: bodies.clone(),
        }
    }

    fn record(bodies: &mut Vec<Body>, body: Body, mode: OrbitMode) {
        match mode {
            OrbitMode::Append => bodies.push(body),
            OrbitMode::Upsert => {
                if let Some(existing) = bodies.iter_mut().find(|b| b.peer_id == body.peer_id) {
                    *existing = body;
                } else {
                    bodies.push(body);
                }
            }
        }
    }

    /// Copy of the current orbit.
    pub fn snapshot(&self) -> Vec<Body> {
        let bodies = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        bodies.clone()
    }

    pub fn len(&self) -> usize {
        let bodies = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All bodies recorded for `peer_id`, oldest first.
    pub fn bodies_for(&self, peer_id: &str) -> Vec<Body> {
        let bodies = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        bodies
            .iter()
            .filter(|b| b.peer_id == peer_id)
            .cloned()
            .collect()
    }

    pub fn contains_peer(&self, peer_id: &str) -> bool {
        let bodies = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        bodies.iter().any(|b| b.peer_id == peer_id)
    }
}

impl Default for Orbit {
    fn default() -> Self {
        Self::new(Vec::new(), OrbitMode::default())
    }
}
