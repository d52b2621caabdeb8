//! Daemon settings file handling
//!
//! Tunables for the daemon and client live in an optional `config.toml` in
//! the platform config directory. Everything has a sensible default, so the
//! file is rarely needed.

use serde::Deserialize;

use super::paths::config_path;
use super::Result;

/// Main settings structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Daemon listener settings
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Daemon listener and pool settings
#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Host the daemon binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the daemon binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Close server connections unused for this many seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often the idle sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    56789
}
fn default_idle_timeout() -> u64 {
    5 * 60
}
fn default_sweep_interval() -> u64 {
    60
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for spawning an MCP server and completing its handshake
    #[serde(default = "default_connect")]
    pub connect_secs: u64,

    /// Client-side timeout for one daemon request
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// How long the client waits for an auto-started daemon to come up
    #[serde(default = "default_spawn_wait")]
    pub spawn_wait_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect(),
            request_secs: default_request(),
            spawn_wait_secs: default_spawn_wait(),
        }
    }
}

fn default_connect() -> u64 {
    10
}
fn default_request() -> u64 {
    30
}
fn default_spawn_wait() -> u64 {
    5
}

impl Config {
    /// Load settings from the default config file
    ///
    /// Returns default settings if the file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return toml::from_str(&content)
                    .map_err(|e| super::Error::SettingsParse(e.to_string()));
            }
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert_eq!(config.daemon.port, 56789);
        assert_eq!(config.daemon.idle_timeout_secs, 300);
        assert_eq!(config.daemon.sweep_interval_secs, 60);
        assert_eq!(config.timeouts.request_secs, 30);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [daemon]
            port = 50000
            "#,
        )
        .unwrap();
        assert_eq!(config.daemon.port, 50000);
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert_eq!(config.timeouts.connect_secs, 10);
    }
}
