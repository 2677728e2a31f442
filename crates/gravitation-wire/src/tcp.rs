//! TcpTransport — one TCP connection per protocol stream.
//!
//! The opener writes a [`StreamHello`] frame naming the protocol, its own
//! peer id and the address it listens on. The acceptor dispatches the
//! connection to the handler registered for that protocol. The opener's
//! listen address rides along on the [`PeerStream`]; the engine records it
//! once a message on the stream authenticates, so responses can be routed
//! back on a fresh stream without any discovery step.

use crate::error::{WireError, WireResult};
use crate::message::{decode, encode, StreamHello};
use crate::transport::{read_frame_limited, write_frame, PeerStream, StreamHandler, Transport};

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Largest accepted hello frame.
pub const MAX_HELLO_SIZE: u32 = 4 * 1024;

/// How long an accepted connection may take to send its hello.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP-backed [`Transport`].
pub struct TcpTransport {
    local_id: String,
    local_addr: SocketAddr,
    handlers: Arc<DashMap<String, StreamHandler>>,
    address_book: Arc<DashMap<String, SocketAddr>>,
}

impl TcpTransport {
    /// Bind the listener and start accepting streams.
    pub async fn bind(
        local_id: impl Into<String>,
        listen_addr: SocketAddr,
    ) -> WireResult<(Arc<Self>, JoinHandle<()>)> {
        let local_id = local_id.into();
        let listener = TcpListener::bind(listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!("GRV: listening on {} (peer_id={})", local_addr, local_id);

        let transport = Arc::new(Self {
            local_id,
            local_addr,
            handlers: Arc::new(DashMap::new()),
            address_book: Arc::new(DashMap::new()),
        });

        let accept_handle = tokio::spawn(accept_loop(
            listener,
            transport.local_id.clone(),
            Arc::clone(&transport.handlers),
        ));

        Ok((transport, accept_handle))
    }

    /// Actual bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Record where `peer_id` accepts connections.
    pub fn add_peer(&self, peer_id: impl Into<String>, addr: SocketAddr) {
        self.address_book.insert(peer_id.into(), addr);
    }

    pub fn peer_addr(&self, peer_id: &str) -> Option<SocketAddr> {
        self.address_book.get(peer_id).map(|a| *a.value())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_id(&self) -> &str {
        &self.local_id
    }

    async fn open_stream(&self, peer_id: &str, protocol: &str) -> WireResult<PeerStream> {
        let addr = self
            .peer_addr(peer_id)
            .ok_or_else(|| WireError::UnknownPeer(peer_id.to_string()))?;

        let mut stream = TcpStream::connect(addr).await.map_err(|e| {
            WireError::Transport(format!("connect to {peer_id} at {addr} failed: {e}"))
        })?;

        let hello = StreamHello {
            protocol: protocol.to_string(),
            peer_id: self.local_id.clone(),
            listen_addr: Some(self.local_addr.to_string()),
        };
        write_frame(&mut stream, &encode(&hello)?).await?;

        debug!(to = %peer_id, %addr, protocol, "tcp stream opened");
        Ok(PeerStream::new(
            self.local_id.as_str(),
            peer_id,
            protocol,
            stream,
        ))
    }

    fn register_handler(&self, protocol: &str, handler: StreamHandler) {
        self.handlers.insert(protocol.to_string(), handler);
    }

    fn learn_peer_addr(&self, peer_id: &str, addr: SocketAddr) {
        if self.peer_addr(peer_id) != Some(addr) {
            debug!(peer = %peer_id, %addr, "GRV: learned peer address");
            self.address_book.insert(peer_id.to_string(), addr);
        }
    }
}

/// Internal accept loop — runs in a spawned task.
async fn accept_loop(
    listener: TcpListener,
    local_id: String,
    handlers: Arc<DashMap<String, StreamHandler>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("GRV: accepted connection from {}", addr);
                let local_id = local_id.clone();
                let handlers = Arc::clone(&handlers);
                tokio::spawn(async move {
                    if let Err(e) = handle_inbound(stream, addr, local_id, &handlers).await {
                        debug!("GRV: inbound stream from {} ended: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("GRV: accept error: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Read the opener's hello, bounded in size and time.
async fn read_hello<R: AsyncRead + Unpin>(reader: &mut R) -> WireResult<StreamHello> {
    let body = tokio::time::timeout(HELLO_TIMEOUT, read_frame_limited(reader, MAX_HELLO_SIZE))
        .await
        .map_err(|_| WireError::Transport("timed out waiting for stream hello".to_string()))??;
    decode(&body)
}

/// Address the opener can be reached at, as claimed by its hello.
fn claimed_addr(hello: &StreamHello, observed: SocketAddr) -> Option<SocketAddr> {
    let listen = hello.listen_addr.as_deref()?.parse::<SocketAddr>().ok()?;
    // A wildcard bind is reachable at the address we saw the peer on.
    if listen.ip().is_unspecified() {
        Some(SocketAddr::new(observed.ip(), listen.port()))
    } else {
        Some(listen)
    }
}

/// Read the hello frame and hand the connection to the protocol's handler.
async fn handle_inbound(
    mut stream: TcpStream,
    addr: SocketAddr,
    local_id: String,
    handlers: &DashMap<String, StreamHandler>,
) -> WireResult<()> {
    let hello = read_hello(&mut stream).await?;
    let claimed = claimed_addr(&hello, addr);

    let handler = match handlers.get(&hello.protocol) {
        Some(h) => Arc::clone(h.value()),
        None => {
            warn!(
                peer = %hello.peer_id,
                protocol = %hello.protocol,
                "GRV: no handler registered, dropping stream"
            );
            return Err(WireError::NoHandler {
                peer: local_id,
                protocol: hello.protocol,
            });
        }
    };

    let mut peer_stream = PeerStream::new(local_id, hello.peer_id, hello.protocol, stream);
    if let Some(claimed) = claimed {
        peer_stream = peer_stream.with_observed_addr(claimed);
    }
    handler(peer_stream).await;
    Ok(())
}
