//! Platform-appropriate configuration and log paths

use std::path::PathBuf;

/// Project name used for platform directories
const PROJECT_NAME: &str = "mcp-bridge";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/mcp-bridge/`
/// - macOS: `~/Library/Application Support/mcp-bridge/`
/// - Windows: `%APPDATA%\mcp-bridge\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the settings file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .map(|dirs| dirs.data_dir().join("logs"))
}
