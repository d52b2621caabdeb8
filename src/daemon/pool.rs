//! Connection pool for MCP servers
//!
//! Owns at most one live connection per configured server. Connections are
//! started lazily on first use, shared by concurrent requests through a
//! single-flight guard, closed again after an idle period, and torn down
//! together on shutdown.
//!
//! All state transitions happen under one mutex that is never held across an
//! await, so a request task can never observe a half-made transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::ipc::protocol::{ServerEntry, StatusResult};
use crate::mcp::ToolInfo;
use crate::skill::{LoadedSkill, ServerConfig};

/// A live connection to a tool server
///
/// The pool only needs call/list/close, so any protocol client that can
/// provide those can back it.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    /// Call a tool and return its raw result document
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value>;

    /// List the tools the server exposes
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    /// Close the connection. Must not fail; close errors are logged and
    /// swallowed by implementations.
    async fn close(&self);
}

impl std::fmt::Debug for dyn ToolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ToolConnection")
    }
}

/// Factory for tool connections, the seam between pool and protocol client
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ToolConnection>>;
}

/// Outcome of an in-flight initialization, broadcast to every waiter
type InitOutcome = Option<std::result::Result<Arc<dyn ToolConnection>, String>>;

/// Per-server lifecycle state
enum ServerState {
    /// No connection; the next acquire spawns one
    Idle,
    /// Initialization in flight; waiters subscribe to the outcome
    Starting(watch::Receiver<InitOutcome>),
    /// Live connection
    Running(Arc<dyn ToolConnection>),
}

/// Timestamp pair: monotonic for eviction math, wall clock for reporting
#[derive(Clone, Copy)]
struct LastUsed {
    instant: Instant,
    wall: SystemTime,
}

impl LastUsed {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }

    fn epoch_ms(&self) -> u64 {
        self.wall
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// One managed server: immutable descriptor plus lifecycle state
struct ManagedServer {
    config: ServerConfig,
    state: ServerState,
    last_used: Option<LastUsed>,
}

struct PoolInner {
    /// Skill config snapshot; set at most once per daemon lifetime
    skill: Option<LoadedSkill>,
    servers: HashMap<String, ManagedServer>,
}

/// The server connection pool
pub struct ServerPool {
    inner: Mutex<PoolInner>,
    connector: Arc<dyn Connector>,
    idle_timeout: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ServerPool {
    pub fn new(connector: Arc<dyn Connector>, idle_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                skill: None,
                servers: HashMap::new(),
            }),
            connector,
            idle_timeout,
            sweeper: Mutex::new(None),
        }
    }

    /// Register the skill configuration. The first load wins; later calls
    /// are ignored so every client sees one consistent server set.
    pub fn load_config(&self, skill: LoadedSkill) {
        let mut inner = self.inner.lock().unwrap();
        if inner.skill.is_some() {
            tracing::debug!(
                path = %skill.path.display(),
                "config already loaded, ignoring"
            );
            return;
        }

        for config in &skill.config.servers {
            inner.servers.insert(
                config.name.clone(),
                ManagedServer {
                    config: config.clone(),
                    state: ServerState::Idle,
                    last_used: None,
                },
            );
        }

        tracing::info!(
            path = %skill.path.display(),
            skill = %skill.config.name,
            servers = inner.servers.len(),
            "loaded skill config"
        );
        inner.skill = Some(skill);
    }

    /// Whether a skill configuration has been loaded
    pub fn config_loaded(&self) -> bool {
        self.inner.lock().unwrap().skill.is_some()
    }

    /// Get or lazily start the connection for a server.
    ///
    /// Concurrent calls for the same cold server share one spawn: the first
    /// caller flips the state to Starting and registers the outcome channel
    /// in the same critical section, so no interleaved caller can observe
    /// Idle and start a second subprocess.
    pub async fn acquire(&self, name: &str) -> Result<Arc<dyn ToolConnection>> {
        enum Plan {
            Ready(Arc<dyn ToolConnection>),
            Wait(watch::Receiver<InitOutcome>),
            Start(watch::Sender<InitOutcome>, ServerConfig),
        }

        let plan = {
            let mut inner = self.inner.lock().unwrap();
            let server = inner
                .servers
                .get_mut(name)
                .ok_or_else(|| Error::UnknownServer(name.to_string()))?;

            match &server.state {
                ServerState::Running(connection) => {
                    server.last_used = Some(LastUsed::now());
                    Plan::Ready(Arc::clone(connection))
                }
                ServerState::Starting(rx) => Plan::Wait(rx.clone()),
                ServerState::Idle => {
                    let (tx, rx) = watch::channel(None);
                    server.state = ServerState::Starting(rx);
                    Plan::Start(tx, server.config.clone())
                }
            }
        };

        match plan {
            Plan::Ready(connection) => Ok(connection),

            Plan::Wait(mut rx) => {
                let outcome = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| Error::spawn_failed(name, "initialization was abandoned"))?;
                match outcome.as_ref() {
                    Some(Ok(connection)) => Ok(Arc::clone(connection)),
                    Some(Err(message)) => Err(Error::spawn_failed(name, message.clone())),
                    None => Err(Error::spawn_failed(name, "initialization was abandoned")),
                }
            }

            Plan::Start(tx, config) => {
                tracing::info!(server = %name, command = %config.command, "starting MCP server");
                let outcome = self.connector.connect(&config).await;

                let mut inner = self.inner.lock().unwrap();
                if let Some(server) = inner.servers.get_mut(name) {
                    match &outcome {
                        Ok(connection) => {
                            server.state = ServerState::Running(Arc::clone(connection));
                            server.last_used = Some(LastUsed::now());
                        }
                        Err(e) => {
                            // Failure is never cached; the next acquire retries
                            tracing::warn!(server = %name, "start failed: {}", e);
                            server.state = ServerState::Idle;
                        }
                    }
                }
                tx.send_replace(Some(match &outcome {
                    Ok(connection) => Ok(Arc::clone(connection)),
                    Err(e) => Err(spawn_message(e)),
                }));

                outcome
            }
        }
    }

    /// Call a tool on a server, starting it if needed
    pub async fn call(&self, name: &str, tool: &str, arguments: Value) -> Result<Value> {
        let connection = self.acquire(name).await?;
        connection
            .call_tool(tool, arguments)
            .await
            .map_err(|e| tag_server_error(name, e))
    }

    /// List the tools on a server, starting it if needed
    pub async fn list_tools(&self, name: &str) -> Result<Vec<ToolInfo>> {
        let connection = self.acquire(name).await?;
        connection
            .list_tools()
            .await
            .map_err(|e| tag_server_error(name, e))
    }

    /// List every configured server with its running state. Never connects.
    pub fn list_servers(&self) -> Vec<ServerEntry> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<ServerEntry> = inner
            .servers
            .values()
            .map(|server| ServerEntry {
                name: server.config.name.clone(),
                running: matches!(server.state, ServerState::Running(_)),
                last_used_at: server.last_used.map(|t| t.epoch_ms()),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Daemon status. Pure read; works before any config load.
    pub fn status(&self) -> StatusResult {
        let inner = self.inner.lock().unwrap();
        StatusResult {
            config_path: inner
                .skill
                .as_ref()
                .map(|s| s.path.display().to_string()),
            skill_name: inner.skill.as_ref().map(|s| s.config.name.clone()),
            total_backends: inner.servers.len(),
            running_backends: inner
                .servers
                .values()
                .filter(|s| matches!(s.state, ServerState::Running(_)))
                .count(),
        }
    }

    /// Start the recurring idle sweep
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                pool.sweep_idle().await;
            }
        });
        *self.sweeper.lock().unwrap() = Some(handle);
    }

    /// Close connections that have been idle past the threshold.
    ///
    /// Only servers observed Running inside the critical section are
    /// touched; a server in Starting is left alone, and the state flips to
    /// Idle before the connection is closed so a racing acquire either gets
    /// the live connection or respawns cleanly.
    pub async fn sweep_idle(&self) {
        let victims: Vec<(String, Arc<dyn ToolConnection>)> = {
            let mut inner = self.inner.lock().unwrap();
            let idle_timeout = self.idle_timeout;
            inner
                .servers
                .values_mut()
                .filter_map(|server| {
                    let stale = match (&server.state, server.last_used) {
                        (ServerState::Running(_), Some(t)) => {
                            t.instant.elapsed() >= idle_timeout
                        }
                        _ => false,
                    };
                    if !stale {
                        return None;
                    }
                    let ServerState::Running(connection) =
                        std::mem::replace(&mut server.state, ServerState::Idle)
                    else {
                        return None;
                    };
                    Some((server.config.name.clone(), connection))
                })
                .collect()
        };

        for (name, connection) in victims {
            tracing::info!(server = %name, "closing idle server");
            connection.close().await;
        }
    }

    /// Stop the sweep and close every running connection. Close errors are
    /// swallowed. Idempotent.
    pub async fn shutdown_all(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }

        let victims: Vec<(String, Arc<dyn ToolConnection>)> = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .servers
                .values_mut()
                .filter_map(|server| {
                    if !matches!(server.state, ServerState::Running(_)) {
                        return None;
                    }
                    let ServerState::Running(connection) =
                        std::mem::replace(&mut server.state, ServerState::Idle)
                    else {
                        return None;
                    };
                    Some((server.config.name.clone(), connection))
                })
                .collect()
        };

        for (name, connection) in victims {
            tracing::info!(server = %name, "stopping server");
            connection.close().await;
        }
    }
}

/// Extract the inner message of a spawn failure so waiters can rebuild an
/// identically-tagged error instead of double-wrapping
fn spawn_message(e: &Error) -> String {
    match e {
        Error::SpawnFailed { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Tag a forwarded connection error with the server it came from
fn tag_server_error(name: &str, e: Error) -> Error {
    match e {
        e @ (Error::SpawnFailed { .. } | Error::ServerCrashed(_)) => e,
        other => Error::CallFailed {
            server: name.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockConnection {
        closed: Arc<AtomicBool>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolConnection for MockConnection {
        async fn call_tool(&self, _tool: &str, arguments: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let message = arguments["message"].as_str().unwrap_or("");
            Ok(json!({
                "content": [{"type": "text", "text": format!("Echo: {}", message)}]
            }))
        }

        async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
            Ok(vec![ToolInfo {
                name: "echo".to_string(),
                description: Some("Echoes back the input message".to_string()),
                input_schema: None,
            }])
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct MockConnector {
        spawns: AtomicUsize,
        /// How many leading connect attempts should fail
        failures: AtomicUsize,
        /// Delay before each connect resolves, to widen race windows
        delay: Duration,
        last_closed: Mutex<Option<Arc<AtomicBool>>>,
    }

    impl MockConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                spawns: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                delay: Duration::ZERO,
                last_closed: Mutex::new(None),
            })
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                spawns: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                delay,
                last_closed: Mutex::new(None),
            })
        }

        fn fail_next(&self, count: usize) {
            self.failures.store(count, Ordering::SeqCst);
        }

        fn spawn_count(&self) -> usize {
            self.spawns.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ToolConnection>> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::spawn_failed(&config.name, "mock connect failure"));
            }
            let closed = Arc::new(AtomicBool::new(false));
            *self.last_closed.lock().unwrap() = Some(Arc::clone(&closed));
            Ok(Arc::new(MockConnection {
                closed,
                calls: AtomicUsize::new(0),
            }))
        }
    }

    fn skill_with_echo() -> LoadedSkill {
        LoadedSkill {
            config: crate::skill::SkillConfig {
                name: "test-skill".to_string(),
                description: "test".to_string(),
                servers: vec![ServerConfig {
                    name: "echo".to_string(),
                    command: "echo-server".to_string(),
                    args: Vec::new(),
                    env: HashMap::new(),
                }],
            },
            path: PathBuf::from("/tmp/SKILL.md"),
        }
    }

    fn pool_with_echo(connector: Arc<MockConnector>, idle_timeout: Duration) -> Arc<ServerPool> {
        let pool = Arc::new(ServerPool::new(connector, idle_timeout));
        pool.load_config(skill_with_echo());
        pool
    }

    #[tokio::test]
    async fn unknown_server_fails_without_spawn() {
        let connector = MockConnector::new();
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let err = pool.acquire("nope").await.unwrap_err();
        assert!(matches!(err, Error::UnknownServer(_)));
        assert_eq!(connector.spawn_count(), 0);
    }

    #[tokio::test]
    async fn acquire_before_config_load_fails() {
        let connector = MockConnector::new();
        let pool = Arc::new(ServerPool::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            Duration::from_secs(300),
        ));

        assert!(matches!(
            pool.acquire("echo").await.unwrap_err(),
            Error::UnknownServer(_)
        ));
        assert!(!pool.config_loaded());
    }

    #[tokio::test]
    async fn second_call_reuses_connection() {
        let connector = MockConnector::new();
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let first = pool.call("echo", "echo", json!({"message": "hi"})).await.unwrap();
        assert_eq!(first["content"][0]["text"], "Echo: hi");

        pool.call("echo", "echo", json!({"message": "again"})).await.unwrap();
        assert_eq!(connector.spawn_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_spawn() {
        let connector = MockConnector::with_delay(Duration::from_millis(20));
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.call("echo", "echo", json!({"message": i.to_string()}))
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert!(result["content"][0]["text"]
                .as_str()
                .unwrap()
                .starts_with("Echo: "));
        }
        assert_eq!(connector.spawn_count(), 1);
    }

    #[tokio::test]
    async fn spawn_failure_is_not_cached() {
        let connector = MockConnector::new();
        connector.fail_next(1);
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let err = pool.acquire("echo").await.unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));

        // Retry succeeds with a fresh spawn
        pool.acquire("echo").await.unwrap();
        assert_eq!(connector.spawn_count(), 2);
    }

    #[tokio::test]
    async fn failure_releases_all_waiters() {
        let connector = MockConnector::with_delay(Duration::from_millis(20));
        connector.fail_next(1);
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.acquire("echo").await }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::SpawnFailed { .. }), "got {err}");
        }
        assert_eq!(connector.spawn_count(), 1);
    }

    #[tokio::test]
    async fn idle_server_is_evicted_and_respawned() {
        let connector = MockConnector::new();
        // Zero threshold: everything is stale at the next sweep
        let pool = pool_with_echo(Arc::clone(&connector), Duration::ZERO);

        pool.call("echo", "echo", json!({"message": "hi"})).await.unwrap();
        assert!(pool.list_servers()[0].running);
        let closed = connector.last_closed.lock().unwrap().clone().unwrap();

        pool.sweep_idle().await;
        let entries = pool.list_servers();
        assert!(!entries[0].running);
        assert!(entries[0].last_used_at.is_some());
        assert!(closed.load(Ordering::SeqCst));

        pool.call("echo", "echo", json!({"message": "back"})).await.unwrap();
        assert_eq!(connector.spawn_count(), 2);
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_connections_alone() {
        let connector = MockConnector::new();
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        pool.acquire("echo").await.unwrap();
        pool.sweep_idle().await;

        assert!(pool.list_servers()[0].running);
        assert_eq!(connector.spawn_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_everything_and_is_idempotent() {
        let connector = MockConnector::new();
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        pool.acquire("echo").await.unwrap();
        let closed = connector.last_closed.lock().unwrap().clone().unwrap();

        pool.shutdown_all().await;
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(pool.status().running_backends, 0);

        // No running servers left; a second call is a no-op
        pool.shutdown_all().await;
        assert_eq!(pool.status().running_backends, 0);
    }

    #[tokio::test]
    async fn status_works_before_and_after_load() {
        let connector = MockConnector::new();
        let pool = Arc::new(ServerPool::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            Duration::from_secs(300),
        ));

        let status = pool.status();
        assert!(status.config_path.is_none());
        assert!(status.skill_name.is_none());
        assert_eq!(status.total_backends, 0);
        assert_eq!(status.running_backends, 0);

        pool.load_config(skill_with_echo());
        let status = pool.status();
        assert_eq!(status.skill_name.as_deref(), Some("test-skill"));
        assert_eq!(status.total_backends, 1);
        assert_eq!(status.running_backends, 0);

        pool.acquire("echo").await.unwrap();
        assert_eq!(pool.status().running_backends, 1);
    }

    #[tokio::test]
    async fn config_first_path_wins() {
        let connector = MockConnector::new();
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let mut other = skill_with_echo();
        other.path = PathBuf::from("/elsewhere/SKILL.md");
        other.config.name = "other-skill".to_string();
        pool.load_config(other);

        let status = pool.status();
        assert_eq!(status.skill_name.as_deref(), Some("test-skill"));
        assert_eq!(status.config_path.as_deref(), Some("/tmp/SKILL.md"));
    }

    #[tokio::test]
    async fn list_servers_never_connects() {
        let connector = MockConnector::new();
        let pool = pool_with_echo(Arc::clone(&connector), Duration::from_secs(300));

        let entries = pool.list_servers();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "echo");
        assert!(!entries[0].running);
        assert!(entries[0].last_used_at.is_none());
        assert_eq!(connector.spawn_count(), 0);
    }
}
