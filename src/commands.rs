//! CLI command definitions
//!
//! Defines the clap commands for the bridge CLI.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Call a tool on an MCP server
    Call {
        /// Server name from the skill config
        server: String,

        /// Tool name to invoke
        tool: String,

        /// Tool arguments as a JSON object
        args: Option<String>,
    },

    /// List available tools on an MCP server
    ListTools {
        /// Server name from the skill config
        server: String,
    },

    /// List configured MCP servers
    ListServers,

    /// Start the daemon
    Start,

    /// Stop the daemon
    Stop,

    /// Show daemon status
    Status,

    /// Validate the SKILL.md configuration
    Validate,

    /// View daemon logs (for debugging)
    Logs {
        /// Number of lines to show
        #[arg(long, short = 'n', default_value = "50")]
        lines: usize,

        /// Clear the log file
        #[arg(long)]
        clear: bool,
    },

    /// [Hidden] Run in daemon mode - spawned automatically
    #[command(hide = true)]
    Daemon,
}
