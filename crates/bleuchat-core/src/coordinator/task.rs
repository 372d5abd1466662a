//! Room Coordinator task
//!
//! Owns [`RoomState`], the observer and the message store, and applies one
//! event at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::RoomConfig;
use crate::errors::{BleuchatError, BleuchatResult};
use crate::observer::{RoomObserver, RoomUpdate};
use crate::store::MessageStore;
use crate::types::{PeerId, TimeSource};

use super::handlers::EventHandlers;
use super::state::RoomState;
use super::{RoomCommand, RoomEvent, RoomHandle};

// ----------------------------------------------------------------------------
// Room Coordinator
// ----------------------------------------------------------------------------

/// Single-writer task behind a [`RoomHandle`]
pub struct RoomCoordinator {
    state: RoomState,
    config: RoomConfig,
    event_receiver: mpsc::UnboundedReceiver<RoomEvent>,
    command_receiver: mpsc::UnboundedReceiver<RoomCommand>,
    observer: Box<dyn RoomObserver>,
    store: Box<dyn MessageStore>,
    time_source: Arc<dyn TimeSource>,
    running: bool,
}

impl RoomCoordinator {
    /// Create a coordinator and its handle
    ///
    /// History is seeded from `store` before any event is processed.
    pub fn new(
        local_peer: PeerId,
        config: RoomConfig,
        store: Box<dyn MessageStore>,
        observer: Box<dyn RoomObserver>,
        time_source: Arc<dyn TimeSource>,
    ) -> BleuchatResult<(Self, RoomHandle)> {
        config.validate()?;

        let mut state = RoomState::new(local_peer, &config);
        match store.load_recent_messages(config.history_limit) {
            Ok(stored) => {
                debug!("Seeding room history with {} stored message(s)", stored.len());
                state.seed_history(stored);
            }
            Err(e) => warn!("Could not load stored messages: {}", e),
        }

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let handle = RoomHandle::new(local_peer, event_sender, command_sender);

        Ok((
            Self {
                state,
                config,
                event_receiver,
                command_receiver,
                observer,
                store,
                time_source,
                running: true,
            },
            handle,
        ))
    }

    /// Create a coordinator and run it on the current tokio runtime
    pub fn spawn(
        local_peer: PeerId,
        config: RoomConfig,
        store: Box<dyn MessageStore>,
        observer: Box<dyn RoomObserver>,
        time_source: Arc<dyn TimeSource>,
    ) -> BleuchatResult<(RoomHandle, tokio::task::JoinHandle<BleuchatResult<()>>)> {
        let (coordinator, handle) = Self::new(local_peer, config, store, observer, time_source)?;
        Ok((handle, tokio::spawn(coordinator.run())))
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) -> BleuchatResult<()> {
        info!("Room coordinator starting for {}", self.state.local_peer.short());

        let mut expiry = interval(self.config.expiry_tick);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                biased;

                event = self.event_receiver.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.process_event(event) {
                                match e {
                                    // Unrecoverable: nobody is left to hear from us
                                    BleuchatError::Channel { .. } => {
                                        error!("Unrecoverable error, stopping room coordinator: {}", e);
                                        self.running = false;
                                    }
                                    BleuchatError::Fragment(ref fe) => {
                                        warn!("Fragment protocol error: {}", fe);
                                    }
                                    BleuchatError::Radio(ref re) if re.is_expected() => {
                                        debug!("{}", re);
                                    }
                                    _ => {
                                        warn!("Error processing room event: {}", e);
                                    }
                                }
                            }
                        }
                        None => {
                            info!("Room event channel closed, shutting down");
                            break;
                        }
                    }
                }

                command = self.command_receiver.recv() => {
                    match command {
                        Some(RoomCommand::Snapshot(reply)) => {
                            if reply.send(self.state.snapshot()).is_err() {
                                debug!("Snapshot requester went away");
                            }
                        }
                        Some(RoomCommand::Shutdown) => {
                            info!("Room coordinator shutdown requested");
                            self.running = false;
                        }
                        None => {
                            info!("Room command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = expiry.tick() => {
                    let now = self.time_source.now();
                    EventHandlers::handle_expiry_tick(&mut self.state, now);
                }
            }
        }

        info!(
            "Room coordinator stopped ({} events, {} messages, {} duplicates)",
            self.state.stats.events_processed,
            self.state.stats.messages_accepted,
            self.state.stats.duplicates_dropped
        );
        Ok(())
    }

    fn process_event(&mut self, event: RoomEvent) -> BleuchatResult<()> {
        debug!("Processing {}", event.name());
        let now = self.time_source.now();
        let updates = EventHandlers::handle_event(&mut self.state, event, now)?;
        for update in updates {
            self.dispatch(update);
        }
        Ok(())
    }

    fn dispatch(&mut self, update: RoomUpdate) {
        match update {
            RoomUpdate::ScanStarted => self.observer.on_scan_started(),
            RoomUpdate::ScanFinished => self.observer.on_scan_finished(),
            RoomUpdate::Message(message) => {
                if let Err(e) = self.store.append_message(&message) {
                    warn!("Failed to persist message: {}", e);
                }
                self.observer.on_message(&message);
            }
            RoomUpdate::PeerJoined { name, peer } => self.observer.on_peer_joined(&name, peer),
            RoomUpdate::PeerLeft { peer } => self.observer.on_peer_left(peer),
        }
    }
}
