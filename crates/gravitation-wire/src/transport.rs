//! Transport abstraction — per-peer, per-protocol byte streams.
//!
//! The engine never touches sockets directly. A [`Transport`] opens
//! [`PeerStream`]s to a peer for a protocol id and dispatches inbound streams
//! to the handler registered for that protocol, each on its own task.

use crate::error::{WireError, WireResult};
use crate::message::{decode_length, frame, MAX_MESSAGE_SIZE};

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte stream backing a [`PeerStream`].
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamIo for T {}

/// Callback invoked for every inbound stream of a protocol.
pub type StreamHandler = Arc<dyn Fn(PeerStream) -> BoxFuture<'static, ()> + Send + Sync>;

/// A single protocol stream between the local node and one remote peer.
pub struct PeerStream {
    local_peer: String,
    remote_peer: String,
    protocol: String,
    /// Where the remote says it accepts connections. Unverified until a
    /// message on this stream authenticates.
    observed_addr: Option<SocketAddr>,
    io: Box<dyn StreamIo>,
}

impl std::fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerStream")
            .field("local", &self.local_peer)
            .field("remote", &self.remote_peer)
            .field("protocol", &self.protocol)
            .field("observed_addr", &self.observed_addr)
            .finish()
    }
}

impl PeerStream {
    pub fn new(
        local_peer: impl Into<String>,
        remote_peer: impl Into<String>,
        protocol: impl Into<String>,
        io: impl StreamIo + 'static,
    ) -> Self {
        Self {
            local_peer: local_peer.into(),
            remote_peer: remote_peer.into(),
            protocol: protocol.into(),
            observed_addr: None,
            io: Box::new(io),
        }
    }

    pub fn with_observed_addr(mut self, addr: SocketAddr) -> Self {
        self.observed_addr = Some(addr);
        self
    }

    pub fn observed_addr(&self) -> Option<SocketAddr> {
        self.observed_addr
    }

    pub fn local_peer(&self) -> &str {
        &self.local_peer
    }

    pub fn remote_peer(&self) -> &str {
        &self.remote_peer
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Write one length-prefixed frame.
    pub async fn write_frame(&mut self, body: &[u8]) -> WireResult<()> {
        write_frame(&mut self.io, body).await
    }

    /// Read one length-prefixed frame.
    pub async fn read_frame(&mut self) -> WireResult<Vec<u8>> {
        read_frame(&mut self.io).await
    }

    /// Flush and half-close the write side.
    pub async fn close(&mut self) -> WireResult<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

/// Stream host consumed by the engine.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Peer id of the local node.
    fn local_id(&self) -> &str;

    /// Open a new outbound stream to `peer_id` speaking `protocol`.
    async fn open_stream(&self, peer_id: &str, protocol: &str) -> WireResult<PeerStream>;

    /// Route inbound streams for `protocol` to `handler`, replacing any
    /// previous registration.
    fn register_handler(&self, protocol: &str, handler: StreamHandler);

    /// Record where an authenticated peer can be reached. Transports without
    /// addressing ignore this.
    fn learn_peer_addr(&self, _peer_id: &str, _addr: SocketAddr) {}
}

/// Write a framed body (4-byte length + payload).
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    body: &[u8],
) -> WireResult<()> {
    let bytes = frame(body)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed body (4-byte length + payload).
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> WireResult<Vec<u8>> {
    read_frame_limited(reader, MAX_MESSAGE_SIZE).await
}

/// Read a framed body, rejecting length headers above `max`.
pub async fn read_frame_limited<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    max: u32,
) -> WireResult<Vec<u8>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > max {
        return Err(WireError::MessageTooLarge { size: len, max });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
