pub mod demo;
pub mod gravitate;
pub mod keygen;
pub mod node;

use crate::node::CliResult;
use gravitation_types::Body;

/// Print an orbit as a table or as JSON.
pub fn print_orbit(label: &str, orbit: &[Body], json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(orbit)?);
        return Ok(());
    }
    println!("{label} ({} bodies)", orbit.len());
    for (i, body) in orbit.iter().enumerate() {
        println!("  {i:>3}  {:<64}  [{}]", body.peer_id, body.profile.join(", "));
    }
    Ok(())
}
