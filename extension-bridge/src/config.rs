//! Configuration management for the extension bridge.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::extractors::SiteRegistry;
use crate::types::SiteCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub content: ContentConfig,

    /// Extra hostname -> category entries, overriding the built-in table
    #[serde(default)]
    pub sites: BTreeMap<String, SiteCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Registered name of the native messaging host
    #[serde(default = "default_peer_name")]
    pub peer_name: String,

    /// Delay before the second reconnect attempt
    #[serde(default = "default_initial_backoff")]
    pub reconnect_initial_backoff_ms: u64,

    /// Upper bound for the doubling reconnect delay
    #[serde(default = "default_max_backoff")]
    pub reconnect_max_backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            peer_name: default_peer_name(),
            reconnect_initial_backoff_ms: default_initial_backoff(),
            reconnect_max_backoff_ms: default_max_backoff(),
        }
    }
}

impl ConnectionConfig {
    /// Never zero, so doubling always makes progress
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_backoff_ms.max(1))
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_backoff_ms).max(self.initial_backoff())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Extra delivery attempts after a failed send
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,

    /// Restrict the active-tab query to the focused window
    #[serde(default = "default_true")]
    pub focused_window_only: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            send_retries: default_send_retries(),
            focused_window_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Yield before extraction starts
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl ContentConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_peer_name() -> String {
    "com.example.nativehost".to_string()
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_send_retries() -> u32 {
    1
}

fn default_settle_delay() -> u64 {
    50
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("extension-bridge")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Built-in site table plus the configured overrides
    pub fn site_registry(&self) -> SiteRegistry {
        let mut registry = SiteRegistry::new();
        for (host, category) in &self.sites {
            registry.add_site(host, *category);
        }
        registry
    }
}
