//! Cross-platform path utilities for NeuroStream.
//!
//! Single source of truth for where the daemon keeps its data, its event
//! database, and its configuration file.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/neurostream` | `~/.config/neurostream` |
//! | macOS    | `~/Library/Application Support/neurostream` | same as data dir |
//! | Windows  | `%APPDATA%/neurostream` | same as data dir |

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not create directory: {0}")]
    DirectoryCreation(PathBuf),
}

/// Application identifier used in path construction.
const APP_NAME: &str = "neurostream";

/// Event database file name.
const EVENT_DB_NAME: &str = "events.db";

/// Daemon configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the application data directory.
///
/// Creates the directory if it doesn't exist with owner-only permissions.
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(&data_dir, perms)
                .with_context(|| format!("Failed to set permissions on {}", data_dir.display()))?;
        }
    }

    Ok(data_dir)
}

/// Get the configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/neurostream`
/// - **macOS/Windows**: config lives with data
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoDataDirectory)?;
        let config_dir = config_base.join(APP_NAME);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).with_context(|| {
                format!("Failed to create config directory: {}", config_dir.display())
            })?;

            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(&config_dir, perms).ok();
        }

        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Get the database directory for event storage.
///
/// All platforms: `<data_dir>/db`
pub fn get_db_dir() -> Result<PathBuf> {
    let data_dir = get_data_dir()?;
    let db_dir = data_dir.join("db");

    if !db_dir.exists() {
        fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create database directory: {}", db_dir.display()))?;
    }

    Ok(db_dir)
}

/// Get the path to the event database file.
///
/// # Errors
/// Returns an error if the database directory cannot be determined.
pub fn get_event_db_path() -> Result<PathBuf> {
    Ok(get_db_dir()?.join(EVENT_DB_NAME))
}

/// Get the path to the daemon configuration file.
///
/// # Errors
/// Returns an error if the config directory cannot be determined.
pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the logs directory.
///
/// # Platform Behavior
/// - **macOS**: `~/Library/Logs/neurostream`
/// - **Linux/Windows**: `<data_dir>/logs`
pub fn get_logs_dir() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDirectory)?;
        let logs_dir = home.join("Library").join("Logs").join(APP_NAME);

        if !logs_dir.exists() {
            fs::create_dir_all(&logs_dir).with_context(|| {
                format!("Failed to create logs directory: {}", logs_dir.display())
            })?;
        }

        Ok(logs_dir)
    }

    #[cfg(not(target_os = "macos"))]
    {
        let data_dir = get_data_dir()?;
        let logs_dir = data_dir.join("logs");

        if !logs_dir.exists() {
            fs::create_dir_all(&logs_dir).with_context(|| {
                format!("Failed to create logs directory: {}", logs_dir.display())
            })?;
        }

        Ok(logs_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_creation() {
        let dir = get_data_dir().expect("Should get data directory");
        assert!(dir.exists(), "Data directory should exist");
        assert!(dir.ends_with("neurostream"), "Should end with app name");
    }

    #[test]
    fn test_event_db_path() {
        let path = get_event_db_path().expect("Should get db path");
        assert!(
            path.to_string_lossy().contains("events.db"),
            "Should contain database filename"
        );
    }

    #[test]
    fn test_config_file_path() {
        let path = get_config_file_path().expect("Should get config path");
        assert!(path.ends_with("config.toml"), "Should end with config.toml");
    }

    #[test]
    fn test_logs_dir() {
        let dir = get_logs_dir().expect("Should get logs directory");
        assert!(dir.exists(), "Logs directory should exist");
    }
}
