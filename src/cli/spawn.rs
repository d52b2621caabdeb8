//! Daemon spawning logic
//!
//! Automatically spawns the daemon process when needed, using the same
//! binary with the hidden `daemon` subcommand.

use std::path::Path;
use std::time::Duration;

use crate::common::{config::Config, Error, Result};
use crate::ipc::DaemonClient;

/// Spawn the daemon as a detached background process and wait for it to
/// start accepting connections
pub async fn spawn_daemon(settings: &Config, config_path: Option<&Path>) -> Result<()> {
    tracing::debug!("Spawning daemon process");

    let exe_path = std::env::current_exe()
        .map_err(|e| Error::Internal(format!("Failed to get current executable path: {}", e)))?;

    let mut command = std::process::Command::new(&exe_path);
    command.arg("daemon");
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    // Detach from the terminal so the daemon outlives this invocation
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn daemon: {}", e)))?;

    // Wait for the daemon to start accepting connections
    let spawn_wait = settings.timeouts.spawn_wait_secs;
    let deadline = std::time::Instant::now() + Duration::from_secs(spawn_wait);

    loop {
        if std::time::Instant::now() >= deadline {
            return Err(Error::DaemonSpawnTimeout(spawn_wait));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        match DaemonClient::connect(settings).await {
            Ok(_) => {
                tracing::debug!("Daemon started successfully");
                return Ok(());
            }
            Err(_) => continue,
        }
    }
}
