//! Error types for the MCP bridge
//!
//! Error messages are written for the CLI user (often an LLM agent), with
//! hints on how to resolve common issues.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the MCP bridge
#[derive(Error, Debug)]
pub enum Error {
    // === Daemon/Connection Errors ===
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Failed to spawn daemon: timed out waiting for the port after {0} seconds")]
    DaemonSpawnTimeout(u64),

    #[error("Failed to connect to daemon: {0}")]
    DaemonConnectionFailed(#[source] io::Error),

    #[error("Daemon communication error: {0}")]
    DaemonCommunication(String),

    #[error("Port {0} is already in use. Is another daemon instance running?")]
    AddressInUse(u16),

    #[error("Request timed out after {0} seconds")]
    RequestTimeout(u64),

    // === Pool Errors ===
    #[error("Server '{0}' is not configured. Check the mcp-servers list in SKILL.md")]
    UnknownServer(String),

    #[error("Failed to start MCP server '{server}': {message}")]
    SpawnFailed { server: String, message: String },

    #[error("No config loaded. Provide a SKILL.md path with --config or run from a skill directory")]
    ConfigNotLoaded,

    #[error("Server '{server}': {message}")]
    CallFailed { server: String, message: String },

    /// Error reported by the daemon, passed through verbatim
    #[error("{0}")]
    Remote(String),

    // === MCP Protocol Errors ===
    #[error("MCP server '{0}' exited unexpectedly")]
    ServerCrashed(String),

    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("MCP request '{method}' failed: {message}")]
    McpRequestFailed { method: String, message: String },

    // === Request Errors ===
    #[error("Missing \"{0}\" field in request")]
    MissingField(&'static str),

    #[error("Invalid JSON arguments: {0}")]
    InvalidArguments(String),

    // === Configuration Errors ===
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("No SKILL.md found. Create one or use --config to specify a path")]
    SkillNotFound,

    #[error("Invalid SKILL.md: {0}")]
    SkillParse(String),

    #[error("Environment variable '{0}' is not set")]
    EnvVarNotSet(String),

    #[error("Invalid configuration file: {0}")]
    SettingsParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a spawn failure tagged with the server name
    pub fn spawn_failed(server: &str, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            server: server.to_string(),
            message: message.into(),
        }
    }

    /// Create an MCP request failure
    pub fn mcp_request_failed(method: &str, message: &str) -> Self {
        Self::McpRequestFailed {
            method: method.to_string(),
            message: message.to_string(),
        }
    }
}
