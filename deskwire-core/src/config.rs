//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/deskwire/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/deskwire/` (~/.config/deskwire/)
//! - Data: `$XDG_DATA_HOME/deskwire/` (~/.local/share/deskwire/)
//! - State/Logs: `$XDG_STATE_HOME/deskwire/` (~/.local/state/deskwire/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Push channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Local snapshot storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Push channel configuration
///
/// Topic patterns use `{user_id}` as the substitution point for the
/// authenticated user's id.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Per-user message queue topic pattern
    #[serde(default = "default_user_queue_topic")]
    pub user_queue_topic: String,

    /// Broadcast notification topic
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,

    /// First reconnect delay step in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for the reconnect delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Reconnect attempts before giving up until the next explicit connect
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            user_queue_topic: default_user_queue_topic(),
            notification_topic: default_notification_topic(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl ChannelConfig {
    /// The per-user queue topic for a concrete user id
    pub fn user_topic(&self, user_id: &str) -> String {
        self.user_queue_topic.replace("{user_id}", user_id)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::Config(
                "channel.base_delay_ms must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::Config(
                "channel.max_delay_ms must be >= channel.base_delay_ms".to_string(),
            ));
        }
        if !self.user_queue_topic.contains("{user_id}") {
            return Err(Error::Config(
                "channel.user_queue_topic must contain the {user_id} placeholder".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_user_queue_topic() -> String {
    "/user/{user_id}/queue/messages".to_string()
}

fn default_notification_topic() -> String {
    "/topic/notifications".to_string()
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

/// Local snapshot storage configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Override path for the snapshot database
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// The snapshot database path, falling back to the XDG data dir
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Config::database_path)
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.channel.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/deskwire/config.toml` (~/.config/deskwire/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("deskwire").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite snapshot database)
    ///
    /// `$XDG_DATA_HOME/deskwire/` (~/.local/share/deskwire/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("deskwire")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/deskwire/` (~/.local/state/deskwire/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("deskwire")
    }

    /// Returns the snapshot database file path
    ///
    /// `$XDG_DATA_HOME/deskwire/state.db` (~/.local/share/deskwire/state.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("state.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/deskwire/deskwire.log` (~/.local/state/deskwire/deskwire.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("deskwire.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for host binaries that want explicit, stable path
    /// behavior before handing paths to other components.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
