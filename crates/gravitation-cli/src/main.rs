//! Gravitation CLI — run a node, gravitate toward peers, generate identities.

mod cli;
mod cmd;
mod config;
mod node;

use clap::Parser;
use cli::{Cli, Commands};

fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // Keygen prints secrets only; no config or logging needed.
    if matches!(cli.command, Commands::Keygen) {
        exit_on_error(cmd::keygen::cmd_keygen());
        return;
    }

    let config = config::load_config(cli.config.as_deref());
    init_tracing_stderr(&config.log_level);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async move {
        match cli.command {
            Commands::Node => cmd::node::cmd_node(config).await,
            Commands::Gravitate {
                target,
                json,
                timeout,
            } => cmd::gravitate::cmd_gravitate(config, &target, json, timeout).await,
            Commands::Demo { json } => cmd::demo::cmd_demo(json).await,
            Commands::Keygen => cmd::keygen::cmd_keygen(),
        }
    });
    exit_on_error(result);
}

fn exit_on_error(result: node::CliResult<()>) {
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
