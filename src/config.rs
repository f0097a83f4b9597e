//! Configuration loading.
//!
//! Reads the slotkeeper configuration from a JSON file, then applies
//! `SLOTKEEPER_*` environment overrides and validates the result.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "slotkeeper.json";

/// Where log output goes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoggingBehavior {
    /// Logging disabled entirely.
    None,
    /// Console only.
    #[default]
    ConsoleOnly,
    /// Console plus a file truncated on startup.
    FileOverwrite,
    /// Console plus a file appended to.
    FileAppend,
    /// Console plus a per-room file inside a directory.
    FileDirectory,
}

impl LoggingBehavior {
    /// Whether this behavior writes to a file.
    #[must_use]
    pub fn uses_file(self) -> bool {
        matches!(
            self,
            Self::FileOverwrite | Self::FileAppend | Self::FileDirectory
        )
    }
}

/// Logging section of the configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoggingConfig {
    /// Output behavior.
    #[serde(default)]
    pub behavior: LoggingBehavior,
    /// Log file (or directory for `file_directory`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Level name (`error`, `warn`, `info`, `debug`, `trace`), any case.
    #[serde(default = "default_level")]
    pub level: String,
    /// Colored console output.
    #[serde(default)]
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            behavior: LoggingBehavior::default(),
            path: None,
            level: default_level(),
            color: false,
        }
    }
}

impl LoggingConfig {
    /// Parsed level filter.
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level
            .parse::<log::LevelFilter>()
            .map_err(|e| anyhow::anyhow!("invalid logging level '{}': {e}", self.level))
    }
}

/// Configuration for the slotkeeper client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Room identifier; names the state file and the room page.
    pub room_id: String,
    /// Slot name to connect as.
    pub slot_name: String,
    /// Game sent in the `Connect` command.
    #[serde(default = "default_game")]
    pub game: String,
    /// Directory holding per-room state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Base URL of the room web interface.
    #[serde(default = "default_web_base_url")]
    pub web_base_url: String,
    /// Request item/location catalogs during the handshake.
    #[serde(default = "default_fetch_catalog")]
    pub fetch_catalog: bool,
    /// Upper bound on each handshake read, in seconds.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_game() -> String {
    "Archipelago".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("slotkeeper"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_web_base_url() -> String {
    "https://archipelago.gg".to_string()
}

fn default_fetch_catalog() -> bool {
    true
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load, override from the environment, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(room_id) = lookup("SLOTKEEPER_ROOM") {
            self.room_id = room_id;
        }

        if let Some(slot_name) = lookup("SLOTKEEPER_SLOT") {
            self.slot_name = slot_name;
        }

        if let Some(data_dir) = lookup("SLOTKEEPER_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Some(level) = lookup("SLOTKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Check cross-field constraints and absolutize the logging path.
    pub fn validate(&mut self) -> Result<()> {
        if self.room_id.trim().is_empty() {
            anyhow::bail!("room_id must not be empty");
        }
        if self.slot_name.trim().is_empty() {
            anyhow::bail!("slot_name must not be empty");
        }

        self.logging.level_filter()?;

        if self.logging.behavior.uses_file() && self.logging.path.is_none() {
            anyhow::bail!("logging.path must be set for the selected logging.behavior");
        }
        if let Some(path) = &self.logging.path {
            if path.is_relative() {
                let cwd = std::env::current_dir().context("Could not determine working directory")?;
                self.logging.path = Some(cwd.join(path));
            }
        }

        Ok(())
    }

    /// Handshake read bound.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
