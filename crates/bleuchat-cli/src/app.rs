//! Interactive chat application
//!
//! Owns the chat room, prints room updates as they arrive and turns typed
//! lines into room operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bleuchat_ble::{default_radios, CentralRadio, ChatRoom, PeripheralRadio};
use bleuchat_core::{BleuchatError, ChannelObserver, RoomUpdate, StaticIdentity};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::commands::ChatInput;
use crate::config::AppConfig;
use crate::display::{format_peer, ChatFormatter};
use crate::error::Result;
use crate::identity::PersistedIdentity;
use crate::store::JsonFileStore;

/// Extra time after a scan window for connections to finish
const SCAN_SETTLE_TIME: Duration = Duration::from_secs(2);

/// Main BleuChat application
pub struct BleuchatApp {
    room: ChatRoom,
    identity: Arc<StaticIdentity>,
    persisted: PersistedIdentity,
    config: AppConfig,
    data_dir: PathBuf,
    updates: mpsc::UnboundedReceiver<RoomUpdate>,
    formatter: ChatFormatter,
}

impl BleuchatApp {
    /// Create the app on this platform's radios
    pub async fn new(config: AppConfig, data_dir: PathBuf) -> Result<Self> {
        let (central, peripheral) = default_radios().await?;
        Self::with_radios(config, data_dir, central, peripheral)
    }

    /// Create the app on the given radios
    pub fn with_radios(
        config: AppConfig,
        data_dir: PathBuf,
        central: Arc<dyn CentralRadio>,
        peripheral: Arc<dyn PeripheralRadio>,
    ) -> Result<Self> {
        let persisted = PersistedIdentity::load_or_create(&data_dir, &config.identity)?;
        let identity = Arc::new(persisted.to_static());
        let store = JsonFileStore::open(&data_dir, config.cli.store_capacity)?;
        let (observer, updates) = ChannelObserver::new();

        let room = ChatRoom::builder(identity.clone(), Box::new(observer))
            .with_config(config.room.clone())
            .with_store(Box::new(store))
            .build(central, peripheral)?;

        info!(
            "BleuChat ready as {} ({})",
            persisted.display_name,
            persisted.peer_id.short()
        );
        Ok(Self {
            room,
            identity,
            persisted,
            config,
            data_dir,
            updates,
            formatter: ChatFormatter::new(),
        })
    }

    pub fn room(&self) -> &ChatRoom {
        &self.room
    }

    pub fn display_name(&self) -> &str {
        &self.persisted.display_name
    }

    /// Apply one typed line; returns the lines to print
    pub async fn handle_input(&mut self, input: ChatInput) -> Result<Vec<String>> {
        match input {
            ChatInput::Message(text) => match self.room.send_message(&text).await {
                // Our own message is printed when the room records it
                Ok(_) => Ok(Vec::new()),
                Err(BleuchatError::EmptyMessage) => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            },
            ChatInput::Scan => {
                self.room.refresh().await?;
                Ok(Vec::new())
            }
            ChatInput::Leave => {
                self.room.leave().await;
                Ok(vec!["-- you left the room; /scan to rejoin".to_string()])
            }
            ChatInput::Rename(name) => {
                self.identity.set_display_name(name.clone());
                self.persisted.display_name = name.clone();
                self.persisted.save(&self.data_dir)?;
                Ok(vec![format!(
                    "-- you will appear as {} from the next advertise window",
                    name
                )])
            }
            ChatInput::Peers => self.peer_lines().await,
            ChatInput::Help => Ok(ChatInput::help()),
            ChatInput::Quit | ChatInput::Empty => Ok(Vec::new()),
            ChatInput::Unknown(line) => Ok(vec![format!("-- unknown command: {} (try /help)", line)]),
        }
    }

    async fn peer_lines(&self) -> Result<Vec<String>> {
        let snapshot = self.room.snapshot().await?;
        let mut lines = vec![format!("-- {} in the room", snapshot.room_size)];
        lines.extend(snapshot.peers.iter().map(format_peer));
        Ok(lines)
    }

    /// Format every update received so far
    pub fn drain_updates(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            lines.extend(self.formatter.format_update(&update));
        }
        lines
    }

    /// Recent history, oldest first
    async fn replay_lines(&mut self) -> Result<Vec<String>> {
        let snapshot = self.room.snapshot().await?;
        let mut lines = Vec::new();
        for message in snapshot
            .history
            .iter()
            .take(self.config.cli.replay_history)
            .rev()
        {
            lines.extend(self.formatter.format_message(message));
        }
        Ok(lines)
    }

    /// Scan and advertise once, then report who is in range
    pub async fn scan_once(&self, window: Duration) -> Result<Vec<String>> {
        self.room.refresh_for(Some(window), Some(window)).await?;
        tokio::time::sleep(window + SCAN_SETTLE_TIME).await;
        self.peer_lines().await
    }

    /// Interactive loop over stdin until `/quit` or end of input
    pub async fn run_chat(mut self) -> Result<()> {
        for line in self.replay_lines().await? {
            println!("{}", line);
        }
        if self.config.cli.refresh_on_start {
            if let Err(e) = self.room.refresh().await {
                warn!("Could not start radios: {}", e);
            }
        }
        println!(
            "-- chatting as {}; type /help for commands",
            self.display_name()
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    let input = ChatInput::parse(&line);
                    if input == ChatInput::Quit {
                        break;
                    }
                    match self.handle_input(input).await {
                        Ok(output) => output.iter().for_each(|l| println!("{}", l)),
                        Err(e) => println!("-- {}", e),
                    }
                }
                update = self.updates.recv() => {
                    let Some(update) = update else {
                        warn!("Room stopped");
                        break;
                    };
                    for line in self.formatter.format_update(&update) {
                        println!("{}", line);
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Leave the room and stop the coordinator
    pub async fn shutdown(self) -> Result<()> {
        self.room.shutdown().await?;
        info!("BleuChat stopped");
        Ok(())
    }
}
