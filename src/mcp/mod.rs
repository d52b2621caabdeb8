//! MCP (Model Context Protocol) client implementation
//!
//! This module implements the client side of MCP over stdio for
//! communicating with tool server subprocesses.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{McpConnection, StdioConnector};
pub use protocol::ToolInfo;
