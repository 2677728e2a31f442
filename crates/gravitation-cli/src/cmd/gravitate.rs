use crate::cmd::print_orbit;
use crate::node::{parse_target, CliResult, Node};
use gravitation_types::GravitationConfig;

/// Gravitate once toward `target` and print the local orbit afterwards.
pub async fn cmd_gravitate(
    mut config: GravitationConfig,
    target: &str,
    json: bool,
    timeout: Option<u64>,
) -> CliResult<()> {
    let (peer_id, addr) = parse_target(target)?;
    if let Some(secs) = timeout {
        config.request_timeout_secs = secs;
    }

    let node = Node::start(&config).await?;
    node.transport.add_peer(peer_id.clone(), addr);

    let outcome = node.engine.gravitate_and_wait(&peer_id).await;
    let orbit = node.engine.orbit();
    node.shutdown();

    let response = outcome?;
    if !json {
        println!(
            "gravitation {} answered by {} (profile [{}], sub_orbit {})",
            response.envelope.id,
            peer_id,
            response.profile.join(", "),
            response.sub_orbit.len()
        );
    }
    print_orbit("orbit", &orbit, json)
}
