// Configuration management for the OnionNet CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/onionnet/config.json
// - Linux: ~/.config/onionnet/config.json
// - Windows: %APPDATA%\onionnet\config.json

use anyhow::{Context, Result};
use onionnet_core::{Address, NodeId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host every node binds to and dials
    pub host: String,

    /// Registry listen port
    pub registry_port: u16,

    /// Relay `n` listens on `base_relay_port + n`
    pub base_relay_port: u16,

    /// User `n` listens on `base_user_port + n`
    pub base_user_port: u16,

    /// Serve `/getPrivateKey` on relays (debugging only)
    pub expose_private_keys: bool,

    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,

    /// Write daily-rotated log files here in addition to stderr
    pub log_dir: Option<String>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            registry_port: 8080,
            base_relay_port: 4000,
            base_user_port: 3000,
            expose_private_keys: false,
            log_filter: "info".to_string(),
            log_dir: None,
            path: None,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("onionnet");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the default config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::config_file()?),
        }
    }

    /// Load config from file, or create default if not exists
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            Config::default()
        };
        config.path = Some(path.to_path_buf());

        if !path.exists() {
            config.save()?;
        }
        Ok(config)
    }

    /// Save config to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .context("Config has no backing file")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn relay_port(&self, node_id: NodeId) -> Result<u16> {
        offset_port(self.base_relay_port, node_id)
    }

    pub fn user_port(&self, user_id: u32) -> Result<u16> {
        offset_port(self.base_user_port, user_id)
    }

    pub fn relay_address(&self, node_id: NodeId) -> Result<Address> {
        Ok(Address::from(self.relay_port(node_id)?))
    }

    pub fn user_address(&self, user_id: u32) -> Result<Address> {
        Ok(Address::from(self.user_port(user_id)?))
    }

    pub fn registry_url(&self) -> String {
        self.url_for_port(self.registry_port)
    }

    pub fn url_for_port(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "host" => {
                self.host = value.to_string();
            }
            "registry_port" => {
                self.registry_port = value.parse().context("Invalid port number")?;
            }
            "base_relay_port" => {
                self.base_relay_port = value.parse().context("Invalid port number")?;
            }
            "base_user_port" => {
                self.base_user_port = value.parse().context("Invalid port number")?;
            }
            "expose_private_keys" => {
                self.expose_private_keys = value.parse().context("Invalid boolean value")?;
            }
            "log_filter" => {
                self.log_filter = value.to_string();
            }
            "log_dir" => {
                self.log_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.save()?;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "host" => Some(self.host.clone()),
            "registry_port" => Some(self.registry_port.to_string()),
            "base_relay_port" => Some(self.base_relay_port.to_string()),
            "base_user_port" => Some(self.base_user_port.to_string()),
            "expose_private_keys" => Some(self.expose_private_keys.to_string()),
            "log_filter" => Some(self.log_filter.clone()),
            "log_dir" => self.log_dir.clone(),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("host".to_string(), self.host.clone()),
            ("registry_port".to_string(), self.registry_port.to_string()),
            ("base_relay_port".to_string(), self.base_relay_port.to_string()),
            ("base_user_port".to_string(), self.base_user_port.to_string()),
            ("expose_private_keys".to_string(), self.expose_private_keys.to_string()),
            ("log_filter".to_string(), self.log_filter.clone()),
            ("log_dir".to_string(), self.log_dir.clone().unwrap_or_else(|| "(stderr only)".to_string())),
        ]
    }
}

fn offset_port(base: u16, offset: u32) -> Result<u16> {
    u16::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .with_context(|| format!("Port {} + {} is out of range", base, offset))
}
