//! Herald configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HeraldError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl HeraldConfig {
    /// Load config from the default path (~/.herald/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HeraldError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HeraldError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Herald home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".herald")
    }

    /// Fill secrets from the environment and check required fields.
    pub fn resolve(mut self) -> Result<Self> {
        if let Ok(password) = std::env::var("HERALD_PASSWORD") {
            self.bot.password = password;
        }
        if self.bot.user_id.is_empty() {
            return Err(HeraldError::config("bot.user_id is required"));
        }
        self.scheduler.tz()?;
        Ok(self)
    }
}

/// Account the bot logs in as.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
}

/// Handler dispatch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_secs: u64,
}

fn default_handler_timeout() -> u64 { 5 }

impl DispatchConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout(),
        }
    }
}

/// Outbound queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_backoff")]
    pub rate_limit_backoff_ms: u64,
}

fn default_capacity() -> usize { 100 }
fn default_action_timeout() -> u64 { 10 }
fn default_backoff() -> u64 { 2000 }

impl OutboundConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            action_timeout_secs: default_action_timeout(),
            rate_limit_backoff_ms: default_backoff(),
        }
    }
}

/// Reminder scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA zone name used to resolve wall-clock reminder times.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
}

fn default_timezone() -> String { "EST".into() }
fn default_tick() -> u64 { 15 }

impl SchedulerConfig {
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| HeraldError::Config(format!("Unknown timezone '{}': {e}", self.timezone)))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            tick_secs: default_tick(),
        }
    }
}

/// Where state lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_data_dir() -> String { "~/.herald".into() }
fn default_database() -> String { "herald.db".into() }
fn default_state_file() -> String { "bot-state.json".into() }

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_path().join(&self.database)
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.data_path().join(&self.state_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: default_database(),
            state_file: default_state_file(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub debug: bool,
}
