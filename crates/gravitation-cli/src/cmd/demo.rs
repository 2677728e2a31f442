use crate::cmd::print_orbit;
use crate::node::CliResult;
use gravitation_types::body::profile_of;
use gravitation_types::Body;
use gravitation_wire::{
    Ed25519Identity, GravitationProtocol, Identity, MemoryNetwork, MultisetMatch, ProtocolConfig,
};
use std::sync::Arc;

/// Two nodes on an in-memory network. A `[x, y]` with an empty orbit
/// gravitates toward B `[y, x]`, which already knows one peer.
pub async fn cmd_demo(json: bool) -> CliResult<()> {
    let network = MemoryNetwork::new();

    let a_identity = Arc::new(Ed25519Identity::generate());
    let b_identity = Arc::new(Ed25519Identity::generate());
    let a_transport = network.join(a_identity.local_id());
    let b_transport = network.join(b_identity.local_id());

    let (a, a_sweeper) = GravitationProtocol::start(
        ProtocolConfig::default(),
        a_transport,
        a_identity,
        Arc::new(MultisetMatch),
        profile_of(&["x", "y"]),
        vec![],
    );
    let (b, b_sweeper) = GravitationProtocol::start(
        ProtocolConfig::default(),
        b_transport,
        b_identity,
        Arc::new(MultisetMatch),
        profile_of(&["y", "x"]),
        vec![Body::new("B1", profile_of(&["y", "x"]))],
    );

    let response = a.gravitate_and_wait(b.local_id()).await?;

    if json {
        let report = serde_json::json!({
            "id": response.envelope.id,
            "a": { "peer_id": a.local_id(), "orbit": a.orbit(), "pending": a.pending().len() },
            "b": { "peer_id": b.local_id(), "orbit": b.orbit() },
            "response_sub_orbit": response.sub_orbit,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("A = {}", a.local_id());
        println!("B = {}", b.local_id());
        println!("exchange {} complete, A pending = {}", response.envelope.id, a.pending().len());
        print_orbit("A orbit", &a.orbit(), false)?;
        print_orbit("B orbit", &b.orbit(), false)?;
        print_orbit("response sub_orbit", &response.sub_orbit, false)?;
    }

    a_sweeper.abort();
    b_sweeper.abort();
    Ok(())
}
