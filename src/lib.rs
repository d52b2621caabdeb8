//! MCP bridge - a daemon-backed CLI for MCP tool servers
//!
//! Short-lived CLI invocations talk to a background daemon that keeps MCP
//! server subprocesses warm, so repeated tool calls skip the server startup
//! cost.

pub mod cli;
pub mod commands;
pub mod common;
pub mod daemon;
pub mod ipc;
pub mod mcp;
pub mod skill;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use ipc::protocol::{RequestEnvelope, RequestKind, ResponseEnvelope};
