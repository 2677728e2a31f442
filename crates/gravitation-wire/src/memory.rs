//! MemoryTransport — in-process Transport implementation.
//!
//! A shared [`MemoryNetwork`] maps peer ids to their registered handlers.
//! Opening a stream creates a `tokio::io::duplex` pair, spawns the remote
//! handler with one end and returns the other.

use crate::error::{WireError, WireResult};
use crate::transport::{PeerStream, StreamHandler, Transport};

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

const DUPLEX_BUF_SIZE: usize = 64 * 1024;

type Handlers = Arc<DashMap<String, StreamHandler>>;

/// Shared broker routing streams between [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<RwLock<HashMap<String, Handlers>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer to the network and return its transport.
    pub fn join(&self, peer_id: impl Into<String>) -> Arc<MemoryTransport> {
        let peer_id = peer_id.into();
        let handlers: Handlers = Arc::new(DashMap::new());
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.insert(peer_id.clone(), Arc::clone(&handlers));
        Arc::new(MemoryTransport {
            local_id: peer_id,
            network: self.clone(),
            handlers,
            opened: AtomicUsize::new(0),
        })
    }

    /// Detach a peer. Streams already open stay usable.
    pub fn leave(&self, peer_id: &str) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.remove(peer_id).is_some()
    }

    fn handlers_for(&self, peer_id: &str) -> Option<Handlers> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(peer_id).cloned()
    }
}

/// In-memory transport for one peer of a [`MemoryNetwork`].
pub struct MemoryTransport {
    local_id: String,
    network: MemoryNetwork,
    handlers: Handlers,
    opened: AtomicUsize,
}

impl MemoryTransport {
    /// Number of outbound streams this transport has opened.
    pub fn streams_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_id(&self) -> &str {
        &self.local_id
    }

    async fn open_stream(&self, peer_id: &str, protocol: &str) -> WireResult<PeerStream> {
        let handlers = self
            .network
            .handlers_for(peer_id)
            .ok_or_else(|| WireError::UnknownPeer(peer_id.to_string()))?;
        let handler = handlers
            .get(protocol)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| WireError::NoHandler {
                peer: peer_id.to_string(),
                protocol: protocol.to_string(),
            })?;

        let (mine, theirs) = tokio::io::duplex(DUPLEX_BUF_SIZE);
        let inbound = PeerStream::new(peer_id, self.local_id.as_str(), protocol, theirs);
        tokio::spawn(handler(inbound));

        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!(from = %self.local_id, to = %peer_id, protocol, "memory stream opened");
        Ok(PeerStream::new(self.local_id.as_str(), peer_id, protocol, mine))
    }

    fn register_handler(&self, protocol: &str, handler: StreamHandler) {
        self.handlers.insert(protocol.to_string(), handler);
    }
}
