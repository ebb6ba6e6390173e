//! Configuration loading and types

use std::path::{Path, PathBuf};

use fleetdeck_api::models::HostDescriptor;
use fleetdeck_core::{FleetSettings, parse_hosts_spec};
use fleetdeck_exec::{KeySource, SshSettings};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FLEETDECK_CONFIG";

/// Environment variable overriding the host list (`id:name:address:flag|...`)
pub const HOSTS_ENV: &str = "FLEETDECK_HOSTS";

/// Top-level configuration for the fleetdeck daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Remote shell settings
    #[serde(default)]
    pub ssh: SshConfig,
    /// Aggregation, caching and background timing
    #[serde(default)]
    pub fleet: FleetSettings,
    /// Container engine hosts
    #[serde(default)]
    pub host: Vec<HostDescriptor>,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Remote shell settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfig {
    /// Login user, port and connect timeout
    #[serde(flatten)]
    pub settings: SshSettings,
    /// Private key file
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Environment variable holding a base64-encoded private key
    #[serde(default)]
    pub key_env: Option<String>,
    /// Passphrase for an encrypted key
    #[serde(default)]
    pub key_passphrase: Option<String>,
}

impl SshConfig {
    /// Where to read the private key from
    ///
    /// `key_env` wins over `key_path`; with neither set the user's
    /// `~/.ssh/id_ed25519` is used.
    #[must_use]
    pub fn key_source(&self) -> KeySource {
        let passphrase = self.key_passphrase.clone();
        if let Some(var) = &self.key_env {
            return KeySource::Env {
                var: var.clone(),
                passphrase,
            };
        }
        let path = self.key_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh/id_ed25519")
        });
        KeySource::Path { path, passphrase }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from the first config file found, or use defaults
    ///
    /// `FLEETDECK_HOSTS` replaces the host list when set.
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<(Self, Option<PathBuf>)> {
        let path = Self::locate();
        let mut config = match &path {
            Some(path) => Self::load(path)?,
            None => Config::default(),
        };
        if let Ok(spec) = std::env::var(HOSTS_ENV) {
            config.apply_hosts_spec(&spec);
        }
        Ok((config, path))
    }

    /// Find the config file: `FLEETDECK_CONFIG`, then the working directory,
    /// `/etc/fleetdeck` and the user config dir
    #[must_use]
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("fleetdeck.toml"),
            PathBuf::from("/etc/fleetdeck/fleetdeck.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetdeck/fleetdeck.toml"));
        }
        paths.into_iter().find(|p| p.is_file())
    }

    /// Replace the host list with one parsed from the env syntax
    pub fn apply_hosts_spec(&mut self, spec: &str) {
        if spec.trim().is_empty() {
            return;
        }
        self.host = parse_hosts_spec(spec);
    }

    /// Configured hosts, or the local engine when none are configured
    #[must_use]
    pub fn hosts(&self) -> Vec<HostDescriptor> {
        if self.host.is_empty() {
            vec![HostDescriptor::local_default()]
        } else {
            self.host.clone()
        }
    }
}
