//! Command handlers for the BleuChat CLI
//!
//! Subcommands are dispatched from here, and lines typed during a chat
//! session are parsed into [`ChatInput`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use bleuchat_core::MessageStore;
use tracing::info;

use crate::app::BleuchatApp;
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::display::ChatFormatter;
use crate::error::Result;
use crate::store::JsonFileStore;

// ----------------------------------------------------------------------------
// Chat Input
// ----------------------------------------------------------------------------

/// One line typed into the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    /// Open new scan and advertise windows
    Scan,
    Leave,
    Rename(String),
    Peers,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ChatInput::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ChatInput::Message(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match (name, arg) {
            ("scan" | "refresh", _) => ChatInput::Scan,
            ("leave", _) => ChatInput::Leave,
            ("name", new_name) if !new_name.is_empty() => ChatInput::Rename(new_name.to_string()),
            ("peers" | "who", _) => ChatInput::Peers,
            ("help" | "?", _) => ChatInput::Help,
            ("quit" | "exit" | "q", _) => ChatInput::Quit,
            _ => ChatInput::Unknown(line.to_string()),
        }
    }

    pub fn help() -> Vec<String> {
        [
            "/scan         look for people and make yourself visible again",
            "/peers        list who is in the room",
            "/name <name>  change your display name",
            "/leave        disconnect from everyone",
            "/quit         leave and exit",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI subcommands
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(command: Commands, mut config: AppConfig, data_dir: PathBuf) -> Result<()> {
        match command {
            Commands::Chat { name } => {
                if let Some(name) = name {
                    config.identity.name = Some(name);
                }
                config.validate()?;
                let app = BleuchatApp::new(config, data_dir).await?;
                app.run_chat().await
            }
            Commands::Peers { seconds } => {
                let app = BleuchatApp::new(config, data_dir).await?;
                for line in app.scan_once(Duration::from_secs(seconds)).await? {
                    println!("{}", line);
                }
                app.shutdown().await
            }
            Commands::History { limit } => {
                for line in Self::history_lines(&config, &data_dir, limit)? {
                    println!("{}", line);
                }
                Ok(())
            }
            Commands::Config => {
                print!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Stored messages, oldest first, as display lines
    pub fn history_lines(config: &AppConfig, data_dir: &Path, limit: usize) -> Result<Vec<String>> {
        let store = JsonFileStore::open(data_dir, config.cli.store_capacity)?;
        let messages = store.load_recent_messages(limit)?;
        info!("Showing {} stored message(s)", messages.len());

        let mut formatter = ChatFormatter::new();
        Ok(messages
            .iter()
            .flat_map(|m| formatter.format_message(m))
            .collect())
    }
}
