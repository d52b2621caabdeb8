//! CLI command handling
//!
//! Dispatches CLI commands to the daemon and formats output. Results are
//! printed as JSON on stdout so scripts and agents can consume them.

mod spawn;

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::commands::Commands;
use crate::common::{config::Config, logging, Error, Result};
use crate::ipc::client::new_request;
use crate::ipc::protocol::{RequestEnvelope, RequestKind, ResponseEnvelope};
use crate::ipc::DaemonClient;
use crate::skill;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config_path: Option<PathBuf>) -> Result<()> {
    let settings = Config::load()?;

    match command {
        Commands::Daemon => {
            // Should never happen - daemon mode is handled in main
            unreachable!("Daemon command should be handled in main")
        }

        Commands::Call { server, tool, args } => {
            let arguments = match args {
                Some(text) => serde_json::from_str(&text)
                    .map_err(|e| Error::InvalidArguments(e.to_string()))?,
                None => json!({}),
            };

            let mut request = new_request(RequestKind::Call);
            request.backend_name = Some(server);
            request.tool_name = Some(tool);
            request.arguments = Some(arguments);

            let response =
                send_with_autostart(&settings, request, config_path.as_deref()).await?;
            print_result(response)
        }

        Commands::ListTools { server } => {
            let mut request = new_request(RequestKind::ListTools);
            request.backend_name = Some(server);

            let response =
                send_with_autostart(&settings, request, config_path.as_deref()).await?;
            print_result(response)
        }

        Commands::ListServers => {
            let request = new_request(RequestKind::ListServers);
            let response =
                send_with_autostart(&settings, request, config_path.as_deref()).await?;
            print_result(response)
        }

        Commands::Start => {
            let already_running = matches!(
                DaemonClient::connect(&settings).await,
                Ok(_)
            );
            if already_running {
                println!("{}", json!({ "success": true, "message": "Daemon already running" }));
                return Ok(());
            }

            let resolved = resolve_config_path(config_path.as_deref());
            spawn::spawn_daemon(&settings, resolved.as_deref().map(Path::new)).await?;
            println!("{}", json!({ "success": true, "message": "Daemon started" }));
            Ok(())
        }

        Commands::Stop => {
            let mut client = match DaemonClient::connect(&settings).await {
                Ok(client) => client,
                Err(Error::DaemonNotRunning) => {
                    println!("{}", json!({ "success": true, "message": "Daemon not running" }));
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let response = client.send(&new_request(RequestKind::Shutdown)).await?;
            if response.success {
                println!("{}", json!({ "success": true, "message": "Daemon stopped" }));
                Ok(())
            } else {
                Err(Error::Remote(
                    response.error.unwrap_or_else(|| "Unknown error".to_string()),
                ))
            }
        }

        Commands::Status => {
            let mut client = match DaemonClient::connect(&settings).await {
                Ok(client) => client,
                Err(Error::DaemonNotRunning) => {
                    println!(
                        "{}",
                        json!({ "running": false, "message": "Daemon not running" })
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let response = client.send(&new_request(RequestKind::Status)).await?;
            match response.result {
                Some(result) if response.success => {
                    let mut status = json!({ "running": true });
                    if let (Some(out), Some(extra)) = (status.as_object_mut(), result.as_object())
                    {
                        for (key, value) in extra {
                            out.insert(key.clone(), value.clone());
                        }
                    }
                    println!("{}", serde_json::to_string_pretty(&status)?);
                    Ok(())
                }
                _ => Err(Error::Remote(
                    response.error.unwrap_or_else(|| "Unknown error".to_string()),
                )),
            }
        }

        Commands::Validate => {
            let loaded = skill::load_skill(config_path.as_deref())?;
            let summary = json!({
                "success": true,
                "path": loaded.path.display().to_string(),
                "name": loaded.config.name,
                "description": loaded.config.description,
                "servers": loaded.config.servers.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }

        Commands::Logs { lines, clear } => {
            if clear {
                logging::truncate_daemon_log()?;
                println!("Log file cleared");
                return Ok(());
            }

            let Some(path) = logging::daemon_log_path() else {
                println!("No log directory available");
                return Ok(());
            };
            if !path.exists() {
                println!("No log file at {}", path.display());
                return Ok(());
            }

            let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(lines);
            for line in &all[start..] {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

/// Resolve the skill config path to attach to a request: the explicit
/// `--config` value, or the nearest SKILL.md above the working directory
fn resolve_config_path(config_path: Option<&Path>) -> Option<String> {
    match config_path {
        Some(path) => {
            let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            Some(absolute.display().to_string())
        }
        None => {
            let cwd = std::env::current_dir().ok()?;
            skill::find_skill_md(&cwd).map(|p| p.display().to_string())
        }
    }
}

/// Send a request, auto-starting the daemon and retrying exactly once if
/// nothing is listening
async fn send_with_autostart(
    settings: &Config,
    mut request: RequestEnvelope,
    config_path: Option<&Path>,
) -> Result<ResponseEnvelope> {
    let resolved = resolve_config_path(config_path);
    request.config_path = resolved.clone();

    match DaemonClient::connect(settings).await {
        Ok(mut client) => client.send(&request).await,
        Err(Error::DaemonNotRunning) => {
            tracing::info!("Daemon not running, starting...");
            spawn::spawn_daemon(settings, resolved.as_deref().map(Path::new)).await?;
            let mut client = DaemonClient::connect(settings).await?;
            client.send(&request).await
        }
        Err(e) => Err(e),
    }
}

/// Print a response result, or surface its error for a non-zero exit
fn print_result(response: ResponseEnvelope) -> Result<()> {
    if response.success {
        let result = response.result.unwrap_or(serde_json::Value::Null);
        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    } else {
        Err(Error::Remote(
            response.error.unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }
}
