//! BleuChat CLI Configuration
//!
//! Configuration is read from a TOML file. Every section and field is
//! optional; missing values fall back to defaults. Command line flags
//! override the file.

use std::path::{Path, PathBuf};

use bleuchat_core::RoomConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "bleuchat";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the BleuChat CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Radio windows, framing and history limits
    pub room: RoomConfig,

    pub identity: IdentityConfig,

    pub cli: CliConfig,
}

/// Who this device is in the room
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name; the persisted one is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fixed peer id; generated once and persisted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
}

/// Terminal behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Open scan and advertise windows as soon as chat starts
    pub refresh_on_start: bool,

    /// Stored messages replayed when chat starts
    pub replay_history: usize,

    /// Messages kept in the history file
    pub store_capacity: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            refresh_on_start: true,
            replay_history: 20,
            store_capacity: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path`, or the default location if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::load_from_file(path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Save configuration, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `<config dir>/bleuchat/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// `<data dir>/bleuchat`, or `./.bleuchat` when the platform has none
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(".bleuchat"))
    }

    pub fn validate(&self) -> Result<()> {
        self.room
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        if let Some(name) = &self.identity.name {
            if name.trim().is_empty() {
                return Err(CliError::Config("identity.name must not be blank".to_string()));
            }
        }
        if let Some(peer_id) = &self.identity.peer_id {
            peer_id
                .parse::<bleuchat_core::PeerId>()
                .map_err(|e| CliError::Config(format!("identity.peer_id: {}", e)))?;
        }
        if self.cli.store_capacity == 0 {
            return Err(CliError::Config("cli.store_capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// Commented starting point for a config file
    pub fn example_config() -> String {
        let example = AppConfig {
            identity: IdentityConfig {
                name: Some("Alice".to_string()),
                peer_id: None,
            },
            ..Default::default()
        };
        let body = toml::to_string_pretty(&example)
            .unwrap_or_else(|e| format!("# failed to render example: {}\n", e));
        format!(
            "# BleuChat configuration\n# Durations are in milliseconds.\n\n{}",
            body
        )
    }
}
