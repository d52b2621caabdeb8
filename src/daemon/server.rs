//! Daemon server - TCP listener and connection handling
//!
//! Each client connection gets a reader loop and a writer task. Requests are
//! parsed strictly in arrival order but dispatched on their own tasks, so a
//! slow tool call never blocks the rest of the connection; responses are
//! correlated by id, not position.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::common::{config::Config, Error, Result};
use crate::ipc::protocol::{RequestEnvelope, RequestKind, ResponseEnvelope};
use crate::mcp::StdioConnector;
use crate::skill;

use super::handler;
use super::pool::ServerPool;

/// Delay between flushing the shutdown response and exiting the accept loop
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Main daemon server
pub struct Daemon {
    settings: Config,
    pool: Arc<ServerPool>,
}

impl Daemon {
    /// Create a new daemon instance, optionally preloading a skill config
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let settings = Config::load()?;

        let connector = Arc::new(StdioConnector::new(Duration::from_secs(
            settings.timeouts.connect_secs,
        )));
        let pool = Arc::new(ServerPool::new(
            connector,
            Duration::from_secs(settings.daemon.idle_timeout_secs),
        ));

        if let Some(path) = config_path {
            let loaded = skill::load_skill(Some(&path))?;
            pool.load_config(loaded);
        }

        Ok(Self { settings, pool })
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.settings.daemon.host, self.settings.daemon.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::AddressInUse(self.settings.daemon.port)
            } else {
                Error::Io(e)
            }
        })?;
        tracing::info!("Daemon listening on {}", addr);

        self.pool
            .start_sweeper(Duration::from_secs(self.settings.daemon.sweep_interval_secs));

        // Shutdown requests signal the accept loop through this channel
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        self.accept_loop(&listener, &shutdown_tx, &mut shutdown_rx)
            .await?;

        tracing::info!("Cleaning up daemon resources");
        self.pool.shutdown_all().await;
        tracing::info!("Daemon shutdown complete");

        Ok(())
    }

    #[cfg(unix)]
    async fn accept_loop(
        &self,
        listener: &TcpListener,
        shutdown_tx: &mpsc::Sender<()>,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down gracefully");
                    return Ok(());
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully");
                    return Ok(());
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown requested, exiting");
                    return Ok(());
                }
                accept_result = listener.accept() => {
                    self.accept(accept_result, shutdown_tx);
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn accept_loop(
        &self,
        listener: &TcpListener,
        shutdown_tx: &mpsc::Sender<()>,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down gracefully");
                    return Ok(());
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown requested, exiting");
                    return Ok(());
                }
                accept_result = listener.accept() => {
                    self.accept(accept_result, shutdown_tx);
                }
            }
        }
    }

    fn accept(
        &self,
        accept_result: std::io::Result<(TcpStream, std::net::SocketAddr)>,
        shutdown_tx: &mpsc::Sender<()>,
    ) {
        match accept_result {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "client connected");
                let pool = Arc::clone(&self.pool);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(handle_client(stream, pool, shutdown_tx));
            }
            Err(e) => {
                tracing::error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single client connection until it disconnects
async fn handle_client(stream: TcpStream, pool: Arc<ServerPool>, shutdown_tx: mpsc::Sender<()>) {
    let (reader, mut writer) = stream.into_split();

    // All responses for this connection fan in here; the writer task owns
    // the socket's write half so interleaved tasks can't corrupt framing.
    let (response_tx, mut response_rx) = mpsc::channel::<ResponseEnvelope>(32);

    let writer_task = tokio::spawn(async move {
        while let Some(response) = response_rx.recv().await {
            let mut line = match serde_json::to_vec(&response) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("failed to serialize response: {}", e);
                    continue;
                }
            };
            line.push(b'\n');
            if writer.write_all(&line).await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RequestEnvelope>(&line) {
                    Ok(request) => {
                        tracing::debug!(id = %request.id, kind = ?request.kind, "received request");
                        let pool = Arc::clone(&pool);
                        let response_tx = response_tx.clone();
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            let is_shutdown = request.kind == RequestKind::Shutdown;
                            let response = handler::handle_request(&pool, request).await;
                            let _ = response_tx.send(response).await;
                            if is_shutdown {
                                // Give the writer a moment to flush the
                                // response before the accept loop exits
                                tokio::time::sleep(SHUTDOWN_GRACE).await;
                                let _ = shutdown_tx.send(()).await;
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Invalid request: {}", e);
                        let _ = response_tx
                            .send(ResponseEnvelope::failure(
                                "unknown",
                                format!("Invalid request: {}", e),
                            ))
                            .await;
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("client disconnected");
                break;
            }
            Err(e) => {
                tracing::debug!("Error reading request: {}", e);
                break;
            }
        }
    }

    drop(response_tx);
    let _ = writer_task.await;
}
