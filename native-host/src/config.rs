//! Configuration management for the native host.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub host: HostSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log destination; stdout is reserved for frames
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// How long a request waits for the extension's answer
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
        }
    }
}

impl HostSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("/tmp/metarelay-host.log"))
}

fn default_response_timeout() -> u64 {
    500
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/metarelay-host.sock")
}

impl HostConfig {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match Self::try_load_from_path(&path) {
            Ok(Some(config)) => {
                info!("Loaded configuration from {:?}", path);
                config
            }
            Ok(None) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Read a config file without logging; `Ok(None)` when it does not exist
    pub fn try_load_from_path(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(toml::from_str(&contents)?))
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("metarelay-host")
            .join("config.toml")
    }
}
