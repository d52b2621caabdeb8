//! MCP client for communicating with tool servers over stdio
//!
//! Spawns the server subprocess, performs the initialize handshake, and
//! issues tools/list and tools/call requests. The connection serializes
//! requests over the child's stdio, which is all the JSON-RPC stdio
//! transport supports anyway.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::common::{Error, Result};
use crate::daemon::pool::{Connector, ToolConnection};
use crate::skill::{env, ServerConfig};

use super::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ToolInfo,
};
use super::transport;

/// IO state guarded by one lock: requests are strictly sequential per server
struct ConnectionIo {
    child: Child,
    reader: BufReader<ChildStdout>,
    writer: BufWriter<ChildStdin>,
    next_id: u64,
}

/// A live connection to one MCP server subprocess
pub struct McpConnection {
    name: String,
    io: Mutex<ConnectionIo>,
}

impl McpConnection {
    /// Spawn the server process and perform the MCP handshake
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        let overrides = env::substitute_map(&config.env)
            .map_err(|e| Error::spawn_failed(&config.name, e.to_string()))?;

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(overrides)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::spawn_failed(&config.name, format!("failed to start {}: {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::spawn_failed(&config.name, "failed to get server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn_failed(&config.name, "failed to get server stdout"))?;

        let connection = Self {
            name: config.name.clone(),
            io: Mutex::new(ConnectionIo {
                child,
                reader: BufReader::new(stdout),
                writer: BufWriter::new(stdin),
                next_id: 1,
            }),
        };

        connection.initialize().await?;
        Ok(connection)
    }

    /// Perform the initialize handshake
    async fn initialize(&self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self
            .request("initialize", Some(params))
            .await
            .map_err(|e| Error::spawn_failed(&self.name, e.to_string()))?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| Error::spawn_failed(&self.name, format!("bad initialize result: {}", e)))?;

        tracing::info!(
            server = %self.name,
            remote = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server ready"
        );

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let mut io = self.io.lock().await;
        transport::write_message(&mut io.writer, &serde_json::to_string(&notification)?).await?;

        Ok(())
    }

    /// Send a request and read messages until its response arrives
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut io = self.io.lock().await;

        let id = io.next_id;
        io.next_id += 1;

        let request = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&request)?;
        tracing::trace!(server = %self.name, ">>> {}", json);
        transport::write_message(&mut io.writer, &json).await?;

        loop {
            let line = transport::read_message(&mut io.reader).await.map_err(|e| {
                if matches!(&e, Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::UnexpectedEof)
                {
                    Error::ServerCrashed(self.name.clone())
                } else {
                    e
                }
            })?;
            tracing::trace!(server = %self.name, "<<< {}", line);

            let message: Value = serde_json::from_str(&line)
                .map_err(|e| Error::McpProtocol(format!("invalid JSON from server: {}", e)))?;

            // Notifications and server-initiated requests carry a method; the
            // bridge has no use for them, so they are skipped.
            if message.get("method").is_some() {
                tracing::debug!(
                    server = %self.name,
                    method = message["method"].as_str().unwrap_or("?"),
                    "ignoring server-initiated message"
                );
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(message)
                .map_err(|e| Error::McpProtocol(format!("invalid response: {}", e)))?;

            if response.id != id {
                tracing::warn!(
                    server = %self.name,
                    expected = id,
                    got = response.id,
                    "response id mismatch, skipping"
                );
                continue;
            }

            return response
                .into_result()
                .map_err(|e| Error::mcp_request_failed(method, &e.message));
        }
    }
}

#[async_trait]
impl ToolConnection for McpConnection {
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        let params = CallToolParams {
            name: tool.to_string(),
            arguments: Some(arguments),
        };
        self.request("tools/call", Some(serde_json::to_value(params)?))
            .await
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let result = self.request("tools/list", None).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| Error::McpProtocol(format!("invalid tools/list result: {}", e)))?;
        Ok(list.tools)
    }

    async fn close(&self) {
        let mut io = self.io.lock().await;
        if let Err(e) = io.child.kill().await {
            tracing::debug!(server = %self.name, "kill on close failed: {}", e);
        }
    }
}

/// Connector that spawns stdio MCP servers, with a handshake timeout
pub struct StdioConnector {
    connect_timeout: std::time::Duration,
}

impl StdioConnector {
    pub fn new(connect_timeout: std::time::Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<std::sync::Arc<dyn ToolConnection>> {
        let secs = self.connect_timeout.as_secs();
        let connection = tokio::time::timeout(self.connect_timeout, McpConnection::connect(config))
            .await
            .map_err(|_| {
                Error::spawn_failed(
                    &config.name,
                    format!("handshake timed out after {} seconds", secs),
                )
            })??;
        Ok(std::sync::Arc::new(connection))
    }
}
