//! Pending-request store — in-flight gravitations awaiting their response.
//!
//! Each entry owns a oneshot sender, so concurrent gravitations are resolved
//! independently. Entries carry a deadline; [`PendingRequests::sweep_expired`]
//! drops stale ones and fails their waiters with [`WireError::Timeout`].

use crate::error::WireError;
use crate::message::{GravitationRequest, GravitationResponse};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a waiter eventually receives.
pub type Completion = Result<GravitationResponse, WireError>;

struct PendingEntry {
    request: GravitationRequest,
    target: String,
    sent_at: DateTime<Utc>,
    deadline: Instant,
    waiter: oneshot::Sender<Completion>,
}

impl PendingEntry {
    fn resolve(self, outcome: Completion) {
        // The caller may have dropped its handle; nothing to do then.
        let _ = self.waiter.send(outcome);
    }
}

/// Summary of an in-flight request.
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub id: String,
    pub target: String,
    pub sent_at: DateTime<Utc>,
}

/// Handle returned to the caller of a gravitation.
#[derive(Debug)]
pub struct PendingGravitation {
    id: String,
    target: String,
    rx: oneshot::Receiver<Completion>,
}

impl PendingGravitation {
    /// Message id of the request.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Wait for the correlated response, a timeout, or cancellation.
    pub async fn wait(self) -> Completion {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(WireError::Cancelled { id: self.id }),
        }
    }
}

/// Concurrent map of in-flight requests keyed by message id.
#[derive(Default)]
pub struct PendingRequests {
    entries: DashMap<String, PendingEntry>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `request` until its response arrives or `ttl` elapses.
    pub fn register(
        &self,
        request: GravitationRequest,
        target: &str,
        ttl: Duration,
    ) -> PendingGravitation {
        let id = request.envelope.id.clone();
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            request,
            target: target.to_string(),
            sent_at: Utc::now(),
            deadline: Instant::now() + ttl,
            waiter: tx,
        };
        if let Some(replaced) = self.entries.insert(id.clone(), entry) {
            warn!(id = %id, target = %replaced.target, "pending request id reused");
        }
        PendingGravitation {
            id,
            target: target.to_string(),
            rx,
        }
    }

    /// Resolve the entry matching the response's message id, provided the
    /// response comes from the peer the request was sent to.
    ///
    /// Returns `false`, leaving the store untouched, when no entry matches.
    pub fn complete(&self, response: GravitationResponse, sender: &str) -> bool {
        let id = response.envelope.id.as_str();
        match self.entries.remove_if(id, |_, e| e.target == sender) {
            Some((id, entry)) => {
                debug!(id = %id, target = %entry.target, "pending request resolved");
                entry.resolve(Ok(response));
                true
            }
            None => {
                if let Some(entry) = self.entries.get(id) {
                    warn!(
                        id = %id,
                        target = %entry.value().target,
                        sender = %sender,
                        "response from a peer the request was not sent to"
                    );
                }
                false
            }
        }
    }

    /// Drop an entry; its waiter observes [`WireError::Cancelled`].
    pub fn cancel(&self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some((id, entry)) => {
                entry.resolve(Err(WireError::Cancelled { id }));
                true
            }
            None => false,
        }
    }

    /// Remove an entry without notifying anyone. Used to roll back a
    /// registration whose send failed.
    pub(crate) fn discard(&self, id: &str) -> Option<GravitationRequest> {
        self.entries.remove(id).map(|(_, entry)| entry.request)
    }

    /// Expire every entry whose deadline has passed. Returns how many were
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().deadline <= now)
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            if let Some((id, entry)) = self.entries.remove_if(&id, |_, e| e.deadline <= now) {
                warn!(id = %id, target = %entry.target, "pending request expired");
                entry.resolve(Err(WireError::Timeout { id }));
                removed += 1;
            }
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// The request sent under `id`, if still pending.
    pub fn request(&self, id: &str) -> Option<GravitationRequest> {
        self.entries.get(id).map(|e| e.value().request.clone())
    }

    pub fn list(&self) -> Vec<PendingInfo> {
        self.entries
            .iter()
            .map(|e| PendingInfo {
                id: e.key().clone(),
                target: e.value().target.clone(),
                sent_at: e.value().sent_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
