//! Shared helpers for coordinator integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bleuchat_core::{
    fragment_payload, BleuchatResult, ChannelObserver, LinkRole, MemoryMessageStore, MessageEnvelope,
    MessageStore, PeerId, RoomConfig, RoomCoordinator, RoomEvent, RoomHandle, RoomUpdate,
    TimeSource, Timestamp,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Clock the test advances by hand
#[derive(Debug, Clone, Default)]
pub struct MockTimeSource {
    current_time: Arc<AtomicU64>,
}

impl MockTimeSource {
    pub fn new_at(start_time: u64) -> Self {
        Self {
            current_time: Arc::new(AtomicU64::new(start_time)),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Shared Store
// ----------------------------------------------------------------------------

/// Message store the test can inspect while the coordinator owns it
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemoryMessageStore>>,
}

impl SharedStore {
    pub fn with_messages(messages: Vec<MessageEnvelope>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryMessageStore::with_messages(messages))),
        }
    }

    pub fn bodies(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .load_recent_messages(usize::MAX)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect()
    }
}

impl MessageStore for SharedStore {
    fn append_message(&mut self, message: &MessageEnvelope) -> BleuchatResult<()> {
        self.inner.lock().unwrap().append_message(message)
    }

    fn load_recent_messages(&self, limit: usize) -> BleuchatResult<Vec<MessageEnvelope>> {
        self.inner.lock().unwrap().load_recent_messages(limit)
    }
}

// ----------------------------------------------------------------------------
// Test Room
// ----------------------------------------------------------------------------

pub fn local_peer() -> PeerId {
    PeerId::from_bytes([0xEE; 16])
}

pub fn alice() -> PeerId {
    PeerId::from_bytes([0xA1; 16])
}

pub fn bob() -> PeerId {
    PeerId::from_bytes([0xB0; 16])
}

/// Coordinator under test plus everything needed to drive it
pub struct TestRoom {
    pub handle: RoomHandle,
    pub updates: mpsc::UnboundedReceiver<RoomUpdate>,
    pub clock: MockTimeSource,
    pub store: SharedStore,
    pub task: JoinHandle<BleuchatResult<()>>,
}

impl TestRoom {
    pub fn start() -> Self {
        Self::start_with(test_config(), SharedStore::default())
    }

    pub fn start_with(config: RoomConfig, store: SharedStore) -> Self {
        let clock = MockTimeSource::new_at(1_000_000);
        let (observer, updates) = ChannelObserver::new();
        let (handle, task) = RoomCoordinator::spawn(
            local_peer(),
            config,
            Box::new(store.clone()),
            Box::new(observer),
            Arc::new(clock.clone()),
        )
        .unwrap();

        Self {
            handle,
            updates,
            clock,
            store,
            task,
        }
    }

    pub fn submit(&self, event: RoomEvent) {
        self.handle.submit(event).unwrap();
    }

    /// Bring `peer` into the room over a central link and consume the join
    pub async fn connect(&mut self, peer: PeerId, name: &str) {
        self.submit(RoomEvent::PeerConnected {
            peer,
            name: name.to_string(),
            role: LinkRole::Central,
        });
        for _ in 0..2 {
            self.next_update().await;
        }
    }

    /// Send an envelope from `peer` as radio writes
    pub fn deliver(&self, peer: PeerId, envelope: &MessageEnvelope, mtu: usize) {
        let encoded = envelope.encode().unwrap();
        for bytes in fragment_payload(&encoded, mtu).unwrap() {
            self.submit(RoomEvent::FragmentReceived { peer, bytes });
        }
    }

    pub async fn next_update(&mut self) -> RoomUpdate {
        tokio::time::timeout(Duration::from_secs(2), self.updates.recv())
            .await
            .expect("timed out waiting for room update")
            .expect("observer channel closed")
    }

    /// Wait for the coordinator to drain, then assert nothing else was emitted
    pub async fn assert_quiet(&mut self) {
        self.handle.snapshot().await.unwrap();
        assert!(
            self.updates.try_recv().is_err(),
            "unexpected extra room update"
        );
    }
}

pub fn test_config() -> RoomConfig {
    RoomConfig::default().with_expiry_tick(Duration::from_millis(10))
}
