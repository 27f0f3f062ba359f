use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::{GoalCategory, OwnerId};
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// User every command acts as unless `--owner` is given
    #[serde(default = "default_owner_id")]
    pub owner_id: i64,
    #[serde(default)]
    pub default_category: GoalCategory,
    /// How long a write waits for another writer before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Fallback log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            owner_id: default_owner_id(),
            default_category: GoalCategory::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            log_level: default_log_level(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    Config::default_database_path_for_profile(utils::Profile::Prod)
}

fn default_owner_id() -> i64 {
    1
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

impl Config {
    /// Load configuration from the profile's config file, or create it with
    /// defaults if missing
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        let mut config = Self::load_from_path(&config_path, profile)?;

        // Keep dev and prod databases apart even if the file was copied over
        if profile == utils::Profile::Dev {
            config.database_path = Self::default_database_path_for_profile(profile);
        }

        Ok(config)
    }

    /// Load configuration from an explicit path, writing defaults there if
    /// the file does not exist yet
    pub fn load_from_path(path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents =
                fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.database_path = Self::default_database_path_for_profile(profile);
            config.save_to_path(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the given path
    pub fn save_to_path(&mut self, path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("goals.db").to_string_lossy().to_string()
        } else {
            format!("~/.local/share/{}/goals.db", profile.app_name())
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    /// Warn when the file was written by a different config version.
    /// Call after the log subscriber is installed.
    pub fn warn_if_outdated(&self) -> bool {
        if self.config_version == Some(CURRENT_CONFIG_VERSION) {
            return false;
        }
        warn!(
            found = ?self.config_version,
            expected = CURRENT_CONFIG_VERSION,
            "config version mismatch"
        );
        true
    }

    pub fn owner(&self) -> OwnerId {
        OwnerId(self.owner_id)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
