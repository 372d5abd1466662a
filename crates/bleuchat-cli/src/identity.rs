//! Persisted local identity
//!
//! The peer id must stay the same across runs so other devices keep
//! recognising us; it is generated once and kept in the data directory.

use std::path::{Path, PathBuf};

use bleuchat_core::{PeerId, StaticIdentity};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::IdentityConfig;
use crate::error::{CliError, Result};

const IDENTITY_FILE_NAME: &str = "identity.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    pub peer_id: PeerId,
    pub display_name: String,
}

impl PersistedIdentity {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(IDENTITY_FILE_NAME)
    }

    /// Resolve the identity from config, falling back to the stored one
    ///
    /// Configured values win; anything missing is generated. The result is
    /// written back when it differs from what was stored.
    pub fn load_or_create(data_dir: &Path, config: &IdentityConfig) -> Result<Self> {
        let stored = Self::load(data_dir)?;

        let peer_id = match (&config.peer_id, &stored) {
            (Some(configured), _) => configured
                .parse()
                .map_err(|e| CliError::Identity(format!("{}", e)))?,
            (None, Some(stored)) => stored.peer_id,
            (None, None) => PeerId::random(),
        };
        let display_name = match (&config.name, &stored) {
            (Some(name), _) => name.trim().to_string(),
            (None, Some(stored)) => stored.display_name.clone(),
            (None, None) => format!("Guest-{}", peer_id.short()),
        };

        let identity = Self {
            peer_id,
            display_name,
        };
        if stored.as_ref() != Some(&identity) {
            identity.save(data_dir)?;
            info!("Saved identity {} ({})", identity.display_name, peer_id.short());
        }
        Ok(identity)
    }

    pub fn load(data_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(data_dir);
        if !path.exists() {
            debug!("No stored identity at {}", path.display());
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| CliError::Identity(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)?;
        std::fs::write(Self::path(data_dir), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn to_static(&self) -> StaticIdentity {
        StaticIdentity::new(self.peer_id, self.display_name.clone())
    }
}
