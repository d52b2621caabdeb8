//! CLI-side client for communicating with the daemon
//!
//! One request per envelope; responses are matched by id because the daemon
//! may interleave responses for pipelined requests.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::common::{config::Config, Error, Result};

use super::protocol::{RequestEnvelope, RequestKind, ResponseEnvelope};

/// Client for communicating with the bridge daemon
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    request_timeout: Duration,
}

impl DaemonClient {
    /// Connect to the running daemon
    pub async fn connect(config: &Config) -> Result<Self> {
        let addr = format!("{}:{}", config.daemon.host, config.daemon.port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                Error::DaemonNotRunning
            } else {
                Error::DaemonConnectionFailed(e)
            }
        })?;

        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        })
    }

    /// Send a request and wait for the matching response
    pub async fn send(&mut self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let secs = self.request_timeout.as_secs();
        tokio::time::timeout(self.request_timeout, self.send_inner(request))
            .await
            .map_err(|_| Error::RequestTimeout(secs))?
    }

    async fn send_inner(&mut self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| Error::DaemonCommunication(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::DaemonCommunication(e.to_string()))?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self
                .reader
                .read_line(&mut buf)
                .await
                .map_err(|e| Error::DaemonCommunication(e.to_string()))?;
            if n == 0 {
                return Err(Error::DaemonCommunication(
                    "daemon closed the connection".to_string(),
                ));
            }
            if buf.trim().is_empty() {
                continue;
            }

            let response: ResponseEnvelope = serde_json::from_str(&buf)
                .map_err(|e| Error::DaemonCommunication(format!("invalid response: {}", e)))?;

            // Responses for other pipelined requests are skipped
            if response.id == request.id {
                return Ok(response);
            }
        }
    }

    /// Check if the daemon is responding
    pub async fn ping(&mut self) -> Result<bool> {
        let request = RequestEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            kind: RequestKind::Status,
            backend_name: None,
            tool_name: None,
            arguments: None,
            config_path: None,
        };
        match self.send(&request).await {
            Ok(_) => Ok(true),
            Err(Error::DaemonNotRunning) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Build a request envelope with a fresh correlation id
pub fn new_request(kind: RequestKind) -> RequestEnvelope {
    RequestEnvelope {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        backend_name: None,
        tool_name: None,
        arguments: None,
        config_path: None,
    }
}
