//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Ad-hoc chat room over Bluetooth Low Energy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for identity and message history
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Join the room and chat interactively (default)
    Chat {
        /// Display name announced to the room
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Scan once and list who is in range
    Peers {
        /// Scan window in seconds
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },
    /// Print stored message history
    History {
        /// Number of messages to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Print an example configuration file
    Config,
}

impl Cli {
    /// Subcommand to run, defaulting to interactive chat
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Chat { name: None })
    }
}
