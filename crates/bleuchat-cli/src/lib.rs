//! BleuChat CLI library
//!
//! Terminal front end for a BleuChat room: configuration, a persisted
//! identity, JSON-lines message history and the interactive chat loop.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod identity;
pub mod store;

pub use app::BleuchatApp;
pub use cli::{Cli, Commands};
pub use commands::{ChatInput, CommandDispatcher};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use identity::PersistedIdentity;
pub use store::JsonFileStore;

// Re-export commonly used types
pub use bleuchat_core::{MessageEnvelope, PeerId, RoomConfig, RoomUpdate};
