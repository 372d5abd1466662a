//! Error handling for the BleuChat CLI

use bleuchat_core::{BleuchatError, RadioError};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Room error: {0}")]
    Room(#[from] BleuchatError),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Message store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<CliError> for BleuchatError {
    fn from(err: CliError) -> Self {
        match err {
            CliError::Room(inner) => inner,
            other => BleuchatError::Storage {
                reason: other.to_string(),
            },
        }
    }
}
