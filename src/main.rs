//! MCP bridge CLI entry point
//!
//! One binary serves both roles: the user-facing CLI and, via the hidden
//! `daemon` subcommand, the background daemon it talks to.

use std::path::PathBuf;

use clap::Parser;
use mcp_bridge::{cli, commands::Commands, common::logging, daemon};

#[derive(Parser)]
#[command(name = "mcp-bridge", about = "Daemon-backed CLI bridge for MCP tool servers")]
#[command(version, long_about = None)]
struct Cli {
    /// Path to the SKILL.md config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let result = match args.command {
        Commands::Daemon => {
            logging::init_daemon();
            daemon::run(args.config).await
        }
        command => {
            logging::init_cli();
            cli::dispatch(command, args.config).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
