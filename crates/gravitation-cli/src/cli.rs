//! Clap CLI definitions for the gravitation node.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  gravitation keygen                       Print a fresh Ed25519 seed and peer id
  gravitation node                         Run a node until Ctrl+C
  gravitation gravitate <peer>@<addr>      Gravitate once toward a peer
  gravitation demo                         Two in-process nodes, one exchange";

/// Gravitation: profile and orbit exchange between peers.
#[derive(Parser)]
#[command(name = "gravitation", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a TCP node until interrupted. Configured peers are gravitated once at startup.
    Node,
    /// Start a node, gravitate toward one peer and print the resulting orbit.
    Gravitate {
        /// Target as `<peer_id>@<host:port>`.
        target: String,
        /// Print the orbit as JSON.
        #[arg(long)]
        json: bool,
        /// Override request_timeout_secs.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run the two-node exchange in-process over the memory transport.
    Demo {
        /// Print the orbits as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Generate an Ed25519 identity.
    Keygen,
}
