use crate::node::CliResult;
use gravitation_wire::{Ed25519Identity, Identity};

pub fn cmd_keygen() -> CliResult<()> {
    let identity = Ed25519Identity::generate();
    println!("peer_id     = {}", identity.local_id());
    println!("signing_key = \"{}\"", identity.seed_hex());
    println!();
    println!("Add the signing_key under [identity] in your config to keep this peer id.");
    Ok(())
}
