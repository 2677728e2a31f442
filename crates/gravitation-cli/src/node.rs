//! Wiring a running node from its configuration.

use gravitation_types::config::{IdentityConfig, IdentityKind};
use gravitation_types::{ConfigError, GravitationConfig};
use gravitation_wire::{
    policy_from_config, Ed25519Identity, GravitationProtocol, Identity, ProtocolConfig,
    SharedSecretIdentity, TcpTransport, WireError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("invalid target '{0}', expected <peer_id>@<host:port>")]
    InvalidTarget(String),
    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

/// Build the signing identity selected by `[identity]`.
pub fn build_identity(config: &IdentityConfig) -> CliResult<Arc<dyn Identity>> {
    match config.kind {
        IdentityKind::Ed25519 => match config.signing_key {
            Some(ref key) => {
                let seed = config.decode_signing_key(key)?;
                Ok(Arc::new(Ed25519Identity::from_seed(&seed)))
            }
            None => {
                let identity = Ed25519Identity::generate();
                info!(
                    peer = %identity.local_id(),
                    "No signing_key configured, using an ephemeral identity"
                );
                Ok(Arc::new(identity))
            }
        },
        IdentityKind::SharedSecret => {
            let node_id = config
                .node_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            Ok(Arc::new(SharedSecretIdentity::new(
                node_id,
                config.shared_secret.clone(),
            )?))
        }
    }
}

/// A node listening on TCP.
pub struct Node {
    pub engine: Arc<GravitationProtocol>,
    pub transport: Arc<TcpTransport>,
    pub acceptor: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
}

impl Node {
    pub async fn start(config: &GravitationConfig) -> CliResult<Self> {
        config.validate()?;
        let identity = build_identity(&config.identity)?;
        let (transport, acceptor) =
            TcpTransport::bind(identity.local_id(), config.listen_socket_addr()?).await?;

        for peer in &config.peers {
            transport.add_peer(peer.peer_id.clone(), peer.socket_addr()?);
        }

        let (engine, sweeper) = GravitationProtocol::start(
            ProtocolConfig::from(config),
            transport.clone(),
            identity,
            policy_from_config(&config.policy),
            config.profile.clone(),
            config.orbit.clone(),
        );

        Ok(Self {
            engine,
            transport,
            acceptor,
            sweeper,
        })
    }

    pub fn shutdown(self) {
        self.acceptor.abort();
        self.sweeper.abort();
    }
}

/// Split `<peer_id>@<host:port>`.
pub fn parse_target(target: &str) -> CliResult<(String, SocketAddr)> {
    let (peer, addr) = target
        .rsplit_once('@')
        .ok_or_else(|| CliError::InvalidTarget(target.to_string()))?;
    if peer.is_empty() {
        return Err(CliError::InvalidTarget(target.to_string()));
    }
    let addr = addr
        .parse()
        .map_err(|_| CliError::InvalidTarget(target.to_string()))?;
    Ok((peer.to_string(), addr))
}
