//! Chat Room
//!
//! Wires a central scanner and a peripheral broadcaster to one room
//! coordinator. This is the surface applications drive.

use std::sync::Arc;
use std::time::Duration;

use bleuchat_core::{
    BleuchatError, BleuchatResult, LocalIdentity, MemoryMessageStore, MessageEnvelope,
    MessageStore, RoomConfig, RoomCoordinator, RoomHandle, RoomObserver, RoomSnapshot,
    SystemTimeSource, TimeSource,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broadcaster::PeripheralBroadcaster;
use crate::radio::{CentralRadio, PeripheralRadio};
use crate::scanner::CentralScanner;

// ----------------------------------------------------------------------------
// Chat Room Builder
// ----------------------------------------------------------------------------

/// Builder for a [`ChatRoom`]
pub struct ChatRoomBuilder {
    identity: Arc<dyn LocalIdentity>,
    observer: Box<dyn RoomObserver>,
    config: RoomConfig,
    store: Option<Box<dyn MessageStore>>,
    time_source: Arc<dyn TimeSource>,
}

impl ChatRoomBuilder {
    pub fn new(identity: Arc<dyn LocalIdentity>, observer: Box<dyn RoomObserver>) -> Self {
        Self {
            identity,
            observer,
            config: RoomConfig::default(),
            store: None,
            time_source: Arc::new(SystemTimeSource::new()),
        }
    }

    pub fn with_config(mut self, config: RoomConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist chat history; defaults to an in-memory store
    pub fn with_store(mut self, store: Box<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Spawn the coordinator on the current runtime and attach both radios
    pub fn build(
        self,
        central: Arc<dyn CentralRadio>,
        peripheral: Arc<dyn PeripheralRadio>,
    ) -> BleuchatResult<ChatRoom> {
        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryMessageStore::default()));

        let (handle, coordinator) = RoomCoordinator::spawn(
            self.identity.peer_id(),
            self.config.clone(),
            store,
            self.observer,
            self.time_source.clone(),
        )?;

        let scanner = CentralScanner::new(
            central,
            self.identity.clone(),
            self.config.clone(),
            handle.event_sender(),
        );
        let broadcaster = PeripheralBroadcaster::new(
            peripheral,
            self.identity.clone(),
            self.config,
            handle.event_sender(),
            self.time_source,
        );

        info!("Chat room ready for {}", handle.local_peer().short());
        Ok(ChatRoom {
            scanner,
            broadcaster,
            handle,
            coordinator: Mutex::new(Some(coordinator)),
        })
    }
}

// ----------------------------------------------------------------------------
// Chat Room
// ----------------------------------------------------------------------------

/// A running room: both radio roles plus the coordinator
pub struct ChatRoom {
    scanner: CentralScanner,
    broadcaster: PeripheralBroadcaster,
    handle: RoomHandle,
    coordinator: Mutex<Option<JoinHandle<BleuchatResult<()>>>>,
}

impl ChatRoom {
    pub fn builder(
        identity: Arc<dyn LocalIdentity>,
        observer: Box<dyn RoomObserver>,
    ) -> ChatRoomBuilder {
        ChatRoomBuilder::new(identity, observer)
    }

    /// Open a scan window and an advertise window with the configured lengths
    pub async fn refresh(&self) -> BleuchatResult<()> {
        self.refresh_for(None, None).await
    }

    /// Open both windows with explicit lengths
    pub async fn refresh_for(
        &self,
        scan: Option<Duration>,
        advertise: Option<Duration>,
    ) -> BleuchatResult<()> {
        let (scanned, advertised) = tokio::join!(
            self.scanner.start_scanning(scan),
            self.broadcaster.start_advertising(advertise),
        );
        if let Err(e) = &advertised {
            warn!("Could not start advertising: {}", e);
        }
        scanned?;
        advertised
    }

    /// Send a chat message to every subscriber
    pub async fn send_message(&self, text: &str) -> BleuchatResult<MessageEnvelope> {
        if self.handle.is_closed() {
            return Err(BleuchatError::channel_closed("room event"));
        }
        self.broadcaster.send_message(text).await
    }

    /// Stop both radios and drop every link
    pub async fn leave(&self) {
        self.broadcaster.stop_advertising().await;
        self.scanner.disconnect_all().await;
        info!("Left the room");
    }

    pub async fn snapshot(&self) -> BleuchatResult<RoomSnapshot> {
        self.handle.snapshot().await
    }

    pub fn handle(&self) -> RoomHandle {
        self.handle.clone()
    }

    pub fn scanner(&self) -> &CentralScanner {
        &self.scanner
    }

    pub fn broadcaster(&self) -> &PeripheralBroadcaster {
        &self.broadcaster
    }

    /// Leave, then stop the coordinator once it has drained queued events
    pub async fn shutdown(&self) -> BleuchatResult<()> {
        self.leave().await;
        if let Err(e) = self.handle.shutdown() {
            warn!("Coordinator already stopped: {}", e);
        }

        let coordinator = self.coordinator.lock().await.take();
        match coordinator {
            Some(task) => task.await.map_err(|e| BleuchatError::Channel {
                message: format!("coordinator task failed: {}", e),
            })?,
            None => Ok(()),
        }
    }
}
