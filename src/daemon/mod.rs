//! Daemon mode - background process holding the MCP server pool
//!
//! The daemon is spawned automatically by CLI commands and keeps server
//! connections warm across CLI invocations.

mod handler;
pub mod pool;
mod server;

use std::path::PathBuf;

use crate::common::Result;

/// Run in daemon mode
///
/// This is the entry point when the binary is invoked with the hidden
/// `daemon` command. The daemon:
/// 1. Binds the local TCP port for CLI connections
/// 2. Accepts requests and dispatches them to the connection pool
/// 3. Evicts idle server connections on a timer
/// 4. Shuts everything down on signal or `shutdown` request
pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting bridge daemon"
    );

    let mut daemon = server::Daemon::new(config_path)?;
    daemon.run().await
}
