//! GravitationProtocol — the request/response engine.
//!
//! A [`GravitationProtocol`] registers one stream handler per protocol id on
//! its [`Transport`]. Requests and responses travel on separate one-shot
//! streams: the initiator opens a request stream to the target, and the
//! responder answers by opening a response stream back to the initiator.
//! Responses are matched to requests by the envelope's message id.
//!
//! Every inbound message passes the [`Identity`] authentication gate before
//! anything else looks at it. Messages that fail to decode or authenticate
//! are logged and dropped without touching the orbit or the pending store.

use crate::error::{WireError, WireResult};
use crate::identity::Identity;
use crate::message::{decode, encode, GravitationRequest, GravitationResponse, SignedMessage};
use crate::orbit::Orbit;
use crate::pending::{PendingGravitation, PendingRequests};
use crate::policy::AcceptancePolicy;
use crate::transport::{PeerStream, Transport};

use futures::FutureExt;
use gravitation_types::config::{GravitationConfig, OrbitMode};
use gravitation_types::{Body, Profile};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// pattern: /protocol-name/message-kind/version
/// Protocol id for gravitation requests.
pub const REQUEST_PROTOCOL: &str = "/gravitation/gravitationreq/0.0.1";
/// Protocol id for gravitation responses.
pub const RESPONSE_PROTOCOL: &str = "/gravitation/gravitationresp/0.0.1";

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// How long a sent request waits for its response.
    pub request_timeout: Duration,
    /// How often expired requests are swept.
    pub sweep_interval: Duration,
    /// Whether repeat admissions of a peer append or replace its body.
    pub orbit_mode: OrbitMode,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            orbit_mode: OrbitMode::Append,
        }
    }
}

impl From<&GravitationConfig> for ProtocolConfig {
    fn from(config: &GravitationConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            sweep_interval: config.sweep_interval(),
            orbit_mode: config.orbit_mode,
        }
    }
}

/// The gravitation protocol engine for one local node.
pub struct GravitationProtocol {
    config: ProtocolConfig,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn Identity>,
    policy: Arc<dyn AcceptancePolicy>,
    profile: Profile,
    orbit: Orbit,
    pending: PendingRequests,
}

impl GravitationProtocol {
    /// Create the engine, register its stream handlers and start the sweep
    /// task. The sweep task exits once the engine is dropped.
    pub fn start(
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn Identity>,
        policy: Arc<dyn AcceptancePolicy>,
        profile: Profile,
        orbit: Vec<Body>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        if transport.local_id() != identity.local_id() {
            warn!(
                transport = %transport.local_id(),
                identity = %identity.local_id(),
                "GRV: transport and identity disagree on the local peer id"
            );
        }

        let engine = Arc::new(Self {
            orbit: Orbit::new(orbit, config.orbit_mode),
            pending: PendingRequests::new(),
            config,
            transport,
            identity,
            policy,
            profile,
        });
        engine.register_handlers();

        info!(
            peer = %engine.local_id(),
            policy = engine.policy.name(),
            profile = ?engine.profile,
            orbit = engine.orbit.len(),
            "GRV: gravitation protocol started"
        );

        let sweeper = tokio::spawn(sweep_loop(
            Arc::downgrade(&engine),
            engine.config.sweep_interval,
        ));
        (engine, sweeper)
    }

    fn register_handlers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.transport.register_handler(
            REQUEST_PROTOCOL,
            Arc::new(move |stream: PeerStream| {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(engine) = weak.upgrade() {
                        engine.on_gravitation_request(stream).await;
                    }
                }
                .boxed()
            }),
        );

        let weak = Arc::downgrade(self);
        self.transport.register_handler(
            RESPONSE_PROTOCOL,
            Arc::new(move |stream: PeerStream| {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(engine) = weak.upgrade() {
                        engine.on_gravitation_response(stream).await;
                    }
                }
                .boxed()
            }),
        );
    }

    pub fn local_id(&self) -> &str {
        self.transport.local_id()
    }

    pub fn profile(&self) -> &[String] {
        &self.profile
    }

    /// Snapshot of the current orbit.
    pub fn orbit(&self) -> Vec<Body> {
        self.orbit.snapshot()
    }

    pub fn orbit_handle(&self) -> &Orbit {
        &self.orbit
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Abandon an in-flight gravitation.
    pub fn cancel(&self, id: &str) -> bool {
        self.pending.cancel(id)
    }

    /// Gravitate toward `target`.
    ///
    /// Returns once the signed request has been written; the returned handle
    /// resolves when the correlated response has been processed, or fails
    /// with [`WireError::Timeout`] after the request timeout. On any error no
    /// pending entry is left behind.
    pub async fn gravitate(&self, target: &str) -> WireResult<PendingGravitation> {
        let result = self.send_request(target).await;
        if let Err(ref e) = result {
            warn!(peer = %target, error = %e, "GRV: gravitation not sent");
        }
        result
    }

    /// Gravitate toward `target` and wait for the exchange to finish.
    pub async fn gravitate_and_wait(&self, target: &str) -> WireResult<GravitationResponse> {
        self.gravitate(target).await?.wait().await
    }

    async fn send_request(&self, target: &str) -> WireResult<PendingGravitation> {
        if self.profile.is_empty() {
            return Err(WireError::EmptyProfile);
        }

        info!("GRV: {}: sending gravitation to {}", self.local_id(), target);

        let id = uuid::Uuid::new_v4().to_string();
        let mut request = GravitationRequest {
            envelope: self.identity.build_envelope(&id, false),
            profile: self.profile.clone(),
            sub_orbit: self.orbit.snapshot(),
        };
        self.sign(&mut request).await?;

        let mut stream = self.transport.open_stream(target, REQUEST_PROTOCOL).await?;
        let body = signed_body(&request)?;
        let sub_orbit = request.sub_orbit.len();

        // Registered before the write rather than after send success, a
        // deliberate departure from send-then-insert ordering: the response
        // can arrive before the write call returns. A failed write discards
        // the entry, so observers may briefly see an entry whose send fails.
        let pending = self
            .pending
            .register(request, target, self.config.request_timeout);

        if let Err(e) = stream.write_frame(&body).await {
            self.pending.discard(&id);
            return Err(e);
        }
        if let Err(e) = stream.close().await {
            debug!(id = %id, error = %e, "GRV: request stream close failed");
        }

        info!(
            "GRV: {}: gravitation to {} was sent (id={}, profile={:?}, sub_orbit={})",
            self.local_id(),
            target,
            id,
            self.profile,
            sub_orbit
        );
        Ok(pending)
    }

    async fn on_gravitation_request(&self, stream: PeerStream) {
        let remote = stream.remote_peer().to_string();
        if let Err(e) = self.handle_request(stream).await {
            warn!(peer = %remote, error = %e, "GRV: dropped gravitation request");
        }
    }

    async fn on_gravitation_response(&self, stream: PeerStream) {
        let remote = stream.remote_peer().to_string();
        if let Err(e) = self.handle_response(stream).await {
            warn!(peer = %remote, error = %e, "GRV: dropped gravitation response");
        }
    }

    /// Responder path: decode, authenticate, admit, answer on a new stream.
    pub(crate) async fn handle_request(&self, mut stream: PeerStream) -> WireResult<()> {
        let request: GravitationRequest = decode(&stream.read_frame().await?)?;
        self.authenticate(&request, &stream)?;
        let remote = request.envelope.node_id.clone();
        self.learn_address(&stream);

        info!(
            "GRV: {}: received gravitation request from {} (id={}, profile={:?}, sub_orbit={})",
            self.local_id(),
            remote,
            request.envelope.id,
            request.profile,
            request.sub_orbit.len()
        );

        let admission = self
            .orbit
            .admit(Body::new(remote.as_str(), request.profile.clone()), |bodies| {
                self.policy
                    .evaluate_request(&self.profile, bodies, &request)
            });
        debug!(
            peer = %remote,
            accepted = admission.accepted,
            orbit = admission.snapshot.len(),
            "GRV: request evaluated"
        );

        let mut response = GravitationResponse {
            envelope: self.identity.build_envelope(&request.envelope.id, false),
            profile: self.profile.clone(),
            sub_orbit: admission.snapshot,
        };
        self.sign(&mut response).await?;

        let mut out = self
            .transport
            .open_stream(&remote, RESPONSE_PROTOCOL)
            .await?;
        send_signed(&mut out, &response).await?;

        info!(
            "GRV: {}: gravitation response to {} sent (id={}, sub_orbit={})",
            self.local_id(),
            remote,
            response.envelope.id,
            response.sub_orbit.len()
        );
        Ok(())
    }

    /// Initiator path: decode, authenticate, admit, resolve the pending entry.
    pub(crate) async fn handle_response(&self, mut stream: PeerStream) -> WireResult<()> {
        let response: GravitationResponse = decode(&stream.read_frame().await?)?;
        self.authenticate(&response, &stream)?;
        let remote = response.envelope.node_id.clone();
        self.learn_address(&stream);

        let admission = self
            .orbit
            .admit(Body::new(remote.as_str(), response.profile.clone()), |bodies| {
                self.policy
                    .evaluate_response(&self.profile, bodies, &response)
            });

        let id = response.envelope.id.clone();
        let profile = response.profile.clone();
        let sub_orbit = response.sub_orbit.len();
        if !self.pending.complete(response, &remote) {
            return Err(WireError::Correlation(id));
        }

        info!(
            "GRV: {}: received gravitation response from {} (id={}, profile={:?}, sub_orbit={}, accepted={})",
            self.local_id(),
            remote,
            id,
            profile,
            sub_orbit,
            admission.accepted
        );
        Ok(())
    }

    /// Verify the signature and that the signer is the peer the stream
    /// came from.
    fn authenticate<M: SignedMessage>(&self, msg: &M, stream: &PeerStream) -> WireResult<()> {
        if msg.envelope().node_id != stream.remote_peer() {
            return Err(WireError::Authentication(format!(
                "message {} signed as {} arrived on a stream from {}",
                msg.envelope().id,
                msg.envelope().node_id,
                stream.remote_peer()
            )));
        }
        let payload = msg.signable_bytes()?;
        if self.identity.authenticate(&payload, msg.envelope()) {
            Ok(())
        } else {
            Err(WireError::Authentication(format!(
                "message {} claiming node {}",
                msg.envelope().id,
                msg.envelope().node_id
            )))
        }
    }

    /// Trust the stream's observed address only once its sender is verified.
    fn learn_address(&self, stream: &PeerStream) {
        if let Some(addr) = stream.observed_addr() {
            self.transport.learn_peer_addr(stream.remote_peer(), addr);
        }
    }

    async fn sign<M: SignedMessage>(&self, msg: &mut M) -> WireResult<()> {
        let payload = msg.signable_bytes()?;
        let signature = self.identity.sign(&payload).await?;
        msg.envelope_mut().signature = signature;
        Ok(())
    }
}

/// Encode a message, refusing ones that were never signed.
fn signed_body<M: SignedMessage>(msg: &M) -> WireResult<Vec<u8>> {
    if !msg.is_signed() {
        return Err(WireError::Signing(format!(
            "refusing to send unsigned message {}",
            msg.envelope().id
        )));
    }
    encode(msg)
}

/// Write a signed message as a single frame and close the stream.
pub async fn send_signed<M: SignedMessage>(stream: &mut PeerStream, msg: &M) -> WireResult<()> {
    let body = signed_body(msg)?;
    stream.write_frame(&body).await?;
    stream.close().await
}

async fn sweep_loop(weak: Weak<GravitationProtocol>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(engine) = weak.upgrade() else {
            break;
        };
        let expired = engine.pending.sweep_expired();
        if expired > 0 {
            debug!(expired, "GRV: swept expired gravitations");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Ed25519Identity, SharedSecretIdentity};
    use crate::memory::{MemoryNetwork, MemoryTransport};
    use crate::policy::MultisetMatch;
    use crate::transport::write_frame;
    use async_trait::async_trait;
    use gravitation_types::body::profile_of;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    struct Node {
        engine: Arc<GravitationProtocol>,
        transport: Arc<MemoryTransport>,
    }

    fn node_with(
        network: &MemoryNetwork,
        profile: &[&str],
        orbit: Vec<Body>,
        config: ProtocolConfig,
    ) -> Node {
        let identity = Arc::new(Ed25519Identity::generate());
        let transport = network.join(identity.local_id());
        let (engine, _sweeper) = GravitationProtocol::start(
            config,
            transport.clone(),
            identity,
            Arc::new(MultisetMatch),
            profile_of(profile),
            orbit,
        );
        Node { engine, transport }
    }

    fn node(network: &MemoryNetwork, profile: &[&str]) -> Node {
        node_with(network, profile, vec![], ProtocolConfig::default())
    }

    async fn signed_request(
        identity: &dyn Identity,
        id: &str,
        profile: &[&str],
    ) -> GravitationRequest {
        let mut request = GravitationRequest {
            envelope: identity.build_envelope(id, false),
            profile: profile_of(profile),
            sub_orbit: vec![],
        };
        request.envelope.signature = identity
            .sign(&request.signable_bytes().unwrap())
            .await
            .unwrap();
        request
    }

    async fn signed_response(
        identity: &dyn Identity,
        id: &str,
        profile: &[&str],
    ) -> GravitationResponse {
        let mut response = GravitationResponse {
            envelope: identity.build_envelope(id, false),
            profile: profile_of(profile),
            sub_orbit: vec![],
        };
        response.envelope.signature = identity
            .sign(&response.signable_bytes().unwrap())
            .await
            .unwrap();
        response
    }

    /// Stream whose remote end has already written `body` as one frame.
    async fn inbound(local: &str, remote: &str, protocol: &str, body: &[u8]) -> PeerStream {
        let (mut theirs, ours) = tokio::io::duplex(64 * 1024);
        write_frame(&mut theirs, body).await.unwrap();
        // Keep the remote end open until the handler is done reading.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(theirs);
        });
        PeerStream::new(local, remote, protocol, ours)
    }

    /// IO that accepts nothing.
    struct BrokenIo;

    impl AsyncRead for BrokenIo {
        fn poll_read(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }
    }

    impl AsyncWrite for BrokenIo {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }
        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Transport whose streams open fine but fail on the first write.
    struct BrokenTransport {
        local_id: String,
        opened: AtomicUsize,
    }

    #[async_trait]
    impl Transport for BrokenTransport {
        fn local_id(&self) -> &str {
            &self.local_id
        }
        async fn open_stream(&self, peer_id: &str, protocol: &str) -> WireResult<PeerStream> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(PeerStream::new(
                self.local_id.as_str(),
                peer_id,
                protocol,
                BrokenIo,
            ))
        }
        fn register_handler(&self, _: &str, _: crate::transport::StreamHandler) {}
    }

    /// Identity whose signer is unavailable.
    struct NoSigner;

    #[async_trait]
    impl Identity for NoSigner {
        fn local_id(&self) -> &str {
            "no-signer"
        }
        async fn sign(&self, _: &[u8]) -> WireResult<Vec<u8>> {
            Err(WireError::Signing("key unavailable".into()))
        }
        fn authenticate(&self, _: &[u8], _: &crate::message::MessageEnvelope) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_gravitate_requires_profile() {
        let network = MemoryNetwork::new();
        let a = node(&network, &[]);
        let b = node(&network, &["x"]);
        let err = a.engine.gravitate(b.engine.local_id()).await.unwrap_err();
        assert!(matches!(err, WireError::EmptyProfile));
        assert_eq!(a.transport.streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_signing_failure_stores_nothing() {
        let network = MemoryNetwork::new();
        let b = node(&network, &["x"]);
        let transport = network.join("no-signer");
        let (engine, _sweeper) = GravitationProtocol::start(
            ProtocolConfig::default(),
            transport.clone(),
            Arc::new(NoSigner),
            Arc::new(MultisetMatch),
            profile_of(&["x"]),
            vec![],
        );

        let err = engine.gravitate(b.engine.local_id()).await.unwrap_err();
        assert!(matches!(err, WireError::Signing(_)));
        assert!(engine.pending().is_empty());
        assert_eq!(transport.streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_stores_nothing() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x"]);
        let err = a.engine.gravitate("nobody").await.unwrap_err();
        assert!(matches!(err, WireError::UnknownPeer(_)));
        assert!(a.engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_leaves_no_pending_entry() {
        let identity = Arc::new(SharedSecretIdentity::new("broken", "s3cret").unwrap());
        let transport = Arc::new(BrokenTransport {
            local_id: "broken".to_string(),
            opened: AtomicUsize::new(0),
        });
        let (engine, _sweeper) = GravitationProtocol::start(
            ProtocolConfig::default(),
            transport.clone(),
            identity,
            Arc::new(MultisetMatch),
            profile_of(&["x"]),
            vec![],
        );

        for _ in 0..3 {
            let err = engine.gravitate("target").await.unwrap_err();
            assert!(matches!(err, WireError::Io(_)));
        }
        assert_eq!(transport.opened.load(Ordering::SeqCst), 3);
        assert!(engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_request_with_bad_signature_is_dropped() {
        let network = MemoryNetwork::new();
        let b = node_with(
            &network,
            &["x", "y"],
            vec![Body::new("B1", profile_of(&["y", "x"]))],
            ProtocolConfig::default(),
        );

        let mallory = Ed25519Identity::generate();
        let mut request = signed_request(&mallory, "req-1", &["x", "y"]).await;
        // Tamper after signing.
        request.sub_orbit.push(Body::new("forged", profile_of(&["x"])));

        let stream = inbound(
            b.engine.local_id(),
            mallory.local_id(),
            REQUEST_PROTOCOL,
            &encode(&request).unwrap(),
        )
        .await;
        let err = b.engine.handle_request(stream).await.unwrap_err();

        assert!(matches!(err, WireError::Authentication(_)));
        assert_eq!(b.engine.orbit().len(), 1);
        assert_eq!(b.transport.streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_request_is_dropped() {
        let network = MemoryNetwork::new();
        let b = node(&network, &["x"]);
        let stream = inbound(b.engine.local_id(), "junk", REQUEST_PROTOCOL, b"\xc1\xc1").await;
        let err = b.engine.handle_request(stream).await.unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
        assert!(b.engine.orbit().is_empty());
        assert_eq!(b.transport.streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_request_signed_by_other_peer_is_rejected() {
        let network = MemoryNetwork::new();
        let b = node(&network, &["x", "y"]);
        let victim = node(&network, &["x", "y"]);

        // Validly signed by mallory, delivered as if the victim opened it.
        let mallory = Ed25519Identity::generate();
        let request = signed_request(&mallory, "req-1", &["x", "y"]).await;
        let stream = inbound(
            b.engine.local_id(),
            victim.engine.local_id(),
            REQUEST_PROTOCOL,
            &encode(&request).unwrap(),
        )
        .await;

        let err = b.engine.handle_request(stream).await.unwrap_err();
        assert!(matches!(err, WireError::Authentication(_)));
        assert!(b.engine.orbit().is_empty());
        assert_eq!(b.transport.streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_response_signed_by_other_peer_is_rejected() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x", "y"]);
        let target = Ed25519Identity::generate();
        let mallory = Ed25519Identity::generate();

        let sent = signed_request(&Ed25519Identity::generate(), "req-1", &["x", "y"]).await;
        let pending = a
            .engine
            .pending()
            .register(sent, target.local_id(), Duration::from_secs(30));

        let forged = signed_response(&mallory, "req-1", &["y", "x"]).await;
        let stream = inbound(
            a.engine.local_id(),
            target.local_id(),
            RESPONSE_PROTOCOL,
            &encode(&forged).unwrap(),
        )
        .await;

        let err = a.engine.handle_response(stream).await.unwrap_err();
        assert!(matches!(err, WireError::Authentication(_)));
        assert!(a.engine.orbit().is_empty());
        assert!(a.engine.pending().contains(pending.id()));
    }

    #[tokio::test]
    async fn test_response_from_wrong_peer_does_not_complete() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x", "y"]);
        let b = Ed25519Identity::generate();
        let c = Ed25519Identity::generate();

        let sent = signed_request(&Ed25519Identity::generate(), "req-b", &["x", "y"]).await;
        let pending = a
            .engine
            .pending()
            .register(sent, b.local_id(), Duration::from_secs(30));

        // C authenticates as itself but reuses the id of B's request.
        let answer = signed_response(&c, "req-b", &["y", "x"]).await;
        let stream = inbound(
            a.engine.local_id(),
            c.local_id(),
            RESPONSE_PROTOCOL,
            &encode(&answer).unwrap(),
        )
        .await;

        let err = a.engine.handle_response(stream).await.unwrap_err();
        assert!(matches!(err, WireError::Correlation(id) if id == "req-b"));
        assert_eq!(a.engine.pending().len(), 1);
        assert!(a.engine.pending().contains("req-b"));

        let waited = tokio::time::timeout(Duration::from_millis(50), pending.wait()).await;
        assert!(waited.is_err(), "no completion expected");
    }

    #[tokio::test]
    async fn test_response_with_bad_signature_changes_nothing() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x", "y"]);
        let responder = Ed25519Identity::generate();

        let sent = signed_request(&Ed25519Identity::generate(), "req-1", &["x", "y"]).await;
        let pending = a
            .engine
            .pending()
            .register(sent, responder.local_id(), Duration::from_secs(30));

        let mut response = signed_response(&responder, "req-1", &["y", "x"]).await;
        response.envelope.signature[0] ^= 0xff;
        let stream = inbound(
            a.engine.local_id(),
            responder.local_id(),
            RESPONSE_PROTOCOL,
            &encode(&response).unwrap(),
        )
        .await;

        let err = a.engine.handle_response(stream).await.unwrap_err();
        assert!(matches!(err, WireError::Authentication(_)));
        assert!(a.engine.orbit().is_empty());
        assert!(a.engine.pending().contains(pending.id()));
    }

    #[tokio::test]
    async fn test_uncorrelated_response_emits_no_completion() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x", "y"]);
        let responder = Ed25519Identity::generate();

        let sent = signed_request(&Ed25519Identity::generate(), "req-1", &["x", "y"]).await;
        let pending = a
            .engine
            .pending()
            .register(sent, responder.local_id(), Duration::from_secs(30));

        let stray = signed_response(&responder, "req-unknown", &["y", "x"]).await;
        let stream = inbound(
            a.engine.local_id(),
            responder.local_id(),
            RESPONSE_PROTOCOL,
            &encode(&stray).unwrap(),
        )
        .await;

        let err = a.engine.handle_response(stream).await.unwrap_err();
        assert!(matches!(err, WireError::Correlation(id) if id == "req-unknown"));
        assert_eq!(a.engine.pending().len(), 1);
        assert!(a.engine.pending().contains("req-1"));
        // The policy ran before the lookup, so the responder is recorded.
        assert_eq!(a.engine.orbit().len(), 1);

        let waited = tokio::time::timeout(Duration::from_millis(50), pending.wait()).await;
        assert!(waited.is_err(), "no completion expected");
    }

    #[tokio::test]
    async fn test_repeat_exchanges_append_duplicates() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x", "y"]);
        let b = node(&network, &["y", "x"]);

        for _ in 0..3 {
            a.engine
                .gravitate_and_wait(b.engine.local_id())
                .await
                .unwrap();
        }

        assert_eq!(a.engine.orbit().len(), 3);
        assert_eq!(b.engine.orbit().len(), 3);
        assert_eq!(
            b.engine
                .orbit_handle()
                .bodies_for(a.engine.local_id())
                .len(),
            3
        );
        assert!(a.engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_mode_records_peer_once() {
        let network = MemoryNetwork::new();
        let config = ProtocolConfig {
            orbit_mode: OrbitMode::Upsert,
            ..Default::default()
        };
        let a = node_with(&network, &["x", "y"], vec![], config.clone());
        let b = node_with(&network, &["y", "x"], vec![], config);

        for _ in 0..3 {
            a.engine
                .gravitate_and_wait(b.engine.local_id())
                .await
                .unwrap();
        }
        assert_eq!(a.engine.orbit().len(), 1);
        assert_eq!(b.engine.orbit().len(), 1);
    }

    #[tokio::test]
    async fn test_policy_rejection_still_answers() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x", "x", "y"]);
        let b = node(&network, &["x", "y", "y"]);

        let response = a
            .engine
            .gravitate_and_wait(b.engine.local_id())
            .await
            .unwrap();
        assert_eq!(response.profile, profile_of(&["x", "y", "y"]));
        assert!(response.sub_orbit.is_empty());
        assert!(a.engine.orbit().is_empty());
        assert!(b.engine.orbit().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_gravitations_resolve_independently() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x"]);
        let b = node(&network, &["x"]);
        let c = node(&network, &["x"]);

        let to_b = a.engine.gravitate(b.engine.local_id()).await.unwrap();
        let to_c = a.engine.gravitate(c.engine.local_id()).await.unwrap();
        let (id_b, id_c) = (to_b.id().to_string(), to_c.id().to_string());
        assert_ne!(id_b, id_c);

        let (rb, rc) = tokio::join!(to_b.wait(), to_c.wait());
        assert_eq!(rb.unwrap().envelope.id, id_b);
        assert_eq!(rc.unwrap().envelope.id, id_c);
        assert_eq!(a.engine.orbit().len(), 2);
        assert!(a.engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let network = MemoryNetwork::new();
        let config = ProtocolConfig {
            request_timeout: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let a = node_with(&network, &["x"], vec![], config);

        // A peer that reads the request and never answers.
        let silent = network.join("silent");
        silent.register_handler(
            REQUEST_PROTOCOL,
            Arc::new(|mut stream: PeerStream| {
                async move {
                    let _ = stream.read_frame().await;
                }
                .boxed()
            }),
        );

        let pending = a.engine.gravitate("silent").await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), pending.wait())
            .await
            .expect("sweep should resolve the waiter");
        assert!(matches!(outcome, Err(WireError::Timeout { .. })));
        assert!(a.engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_releases_waiter() {
        let network = MemoryNetwork::new();
        let a = node(&network, &["x"]);
        let silent = network.join("silent");
        silent.register_handler(
            REQUEST_PROTOCOL,
            Arc::new(|_stream: PeerStream| async {}.boxed()),
        );

        let pending = a.engine.gravitate("silent").await.unwrap();
        assert!(a.engine.cancel(pending.id()));
        assert!(matches!(
            pending.wait().await,
            Err(WireError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_protocol_ids() {
        assert_eq!(REQUEST_PROTOCOL, "/gravitation/gravitationreq/0.0.1");
        assert_eq!(RESPONSE_PROTOCOL, "/gravitation/gravitationresp/0.0.1");
    }

    #[test]
    fn test_protocol_config_from_node_config() {
        let config = GravitationConfig {
            request_timeout_secs: 7,
            sweep_interval_secs: 2,
            orbit_mode: OrbitMode::Upsert,
            ..Default::default()
        };
        let protocol = ProtocolConfig::from(&config);
        assert_eq!(protocol.request_timeout, Duration::from_secs(7));
        assert_eq!(protocol.sweep_interval, Duration::from_secs(2));
        assert_eq!(protocol.orbit_mode, OrbitMode::Upsert);
    }
}
