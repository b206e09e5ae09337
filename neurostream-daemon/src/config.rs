//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use neurostream_board::ConnectionHint;

/// Board connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Direct USB serial port (e.g. "/dev/cu.usbserial-DM00")
    pub serial_port: Option<String>,

    /// Board radio MAC address for direct radio links
    pub mac_address: Option<String>,

    /// BLE dongle serial port; with no target address the dongle scans
    pub dongle_port: Option<String>,

    /// Host radio device file used for direct radio links
    pub builtin_radio_path: Option<String>,

    /// Board sample rate in Hz
    pub sample_rate: u32,

    /// Smallest sample window handed to metric extraction
    pub min_window_samples: usize,

    /// Acquisition cycle period in milliseconds
    pub poll_period_ms: u64,

    /// Use the synthetic board instead of real hardware
    pub synthetic: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            mac_address: None,
            dongle_port: None,
            builtin_radio_path: None,
            sample_rate: 200,
            min_window_samples: 100,
            poll_period_ms: 1000,
            synthetic: false,
        }
    }
}

/// Optional remote replication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Replicate events to the in-process remote store (dev runs)
    pub enabled: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path this configuration was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// WebSocket bind host
    pub host: String,

    /// WebSocket bind port
    pub port: u16,

    /// Event database path (defaults to the platform data dir)
    pub db_path: Option<PathBuf>,

    pub board: BoardConfig,

    pub remote: RemoteConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: neurostream_paths::get_config_file_path()
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
            host: "127.0.0.1".to_string(),
            port: 8765,
            db_path: None,
            board: BoardConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file, or create the default one
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path,
            None => neurostream_paths::get_config_file_path()
                .context("Failed to resolve config directory")?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut config: DaemonConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Environment variables override the board connection fields.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_value("NEUROSTREAM_SERIAL_PORT") {
            self.board.serial_port = Some(value);
        }
        if let Some(value) = env_value("NEUROSTREAM_MAC_ADDRESS") {
            self.board.mac_address = Some(value);
        }
        if let Some(value) = env_value("NEUROSTREAM_DONGLE_PORT") {
            self.board.dongle_port = Some(value);
        }
        if env_value("NEUROSTREAM_BOARD").as_deref() == Some("synthetic") {
            self.board.synthetic = true;
        }
    }

    /// Connection defaults handed to the hub; per-message fields still win.
    pub fn connection_hint(&self) -> ConnectionHint {
        ConnectionHint {
            serial_port: self.board.serial_port.clone(),
            mac_address: self.board.mac_address.clone(),
            dongle_port: self.board.dongle_port.clone(),
        }
    }

    /// Resolved event database location.
    pub fn event_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => neurostream_paths::get_event_db_path()
                .context("Failed to resolve event database path"),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_default_file_and_reloads_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = DaemonConfig::load(Some(path.clone())).unwrap();
        assert!(path.exists());
        assert_eq!(created.port, 8765);
        assert_eq!(created.board.sample_rate, 200);

        let reloaded = DaemonConfig::load(Some(path)).unwrap();
        assert_eq!(reloaded.host, created.host);
        assert_eq!(reloaded.board.min_window_samples, 100);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 9000\n\n[board]\nsynthetic = true\n").unwrap();

        let config = DaemonConfig::load(Some(path)).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.board.synthetic);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.board.poll_period_ms, 1000);
    }

    #[test]
    fn env_overrides_beat_file_values() {
        let mut config = DaemonConfig {
            board: BoardConfig {
                dongle_port: Some("/dev/from-file".to_string()),
                ..BoardConfig::default()
            },
            ..DaemonConfig::default()
        };

        std::env::set_var("NEUROSTREAM_DONGLE_PORT", "/dev/from-env");
        std::env::set_var("NEUROSTREAM_BOARD", "synthetic");
        config.apply_env_overrides();
        std::env::remove_var("NEUROSTREAM_DONGLE_PORT");
        std::env::remove_var("NEUROSTREAM_BOARD");

        assert_eq!(config.board.dongle_port.as_deref(), Some("/dev/from-env"));
        assert!(config.board.synthetic);

        let hint = config.connection_hint();
        assert_eq!(hint.dongle_port.as_deref(), Some("/dev/from-env"));
    }
}
