use crate::cmd::print_orbit;
use crate::node::{CliResult, Node};
use gravitation_types::GravitationConfig;
use tracing::{info, warn};

/// Run until Ctrl+C. Every configured peer is gravitated once at startup.
pub async fn cmd_node(config: GravitationConfig) -> CliResult<()> {
    let node = Node::start(&config).await?;
    println!(
        "gravitation node {} listening on {}",
        node.engine.local_id(),
        node.transport.local_addr()
    );

    for peer in &config.peers {
        let engine = node.engine.clone();
        let target = peer.peer_id.clone();
        tokio::spawn(async move {
            match engine.gravitate_and_wait(&target).await {
                Ok(response) => info!(
                    peer = %target,
                    id = %response.envelope.id,
                    "Startup gravitation complete"
                ),
                Err(e) => warn!(peer = %target, error = %e, "Startup gravitation failed"),
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    print_orbit("orbit", &node.engine.orbit(), false)?;
    node.shutdown();
    Ok(())
}
