//! Scripted radios and room helpers for BLE service tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bleuchat_ble::{
    CentralRadio, CentralRadioEvent, ChatRoom, DeviceId, PeripheralRadio, PeripheralRadioEvent,
};
use bleuchat_core::{
    fragment_payload, ChannelObserver, Hello, MessageEnvelope, PeerId, RadioError, Reassembler,
    RoomConfig, RoomUpdate, StaticIdentity, TimeSource, Timestamp,
};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

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
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

fn unbounded_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

// ----------------------------------------------------------------------------
// Mock Central Radio
// ----------------------------------------------------------------------------

#[derive(Default)]
struct CentralScript {
    scanning: bool,
    scan_starts: usize,
    advertisers: HashMap<DeviceId, Vec<u8>>,
    failing_connects: HashSet<DeviceId>,
    connect_attempts: Vec<DeviceId>,
    written_hellos: Vec<(DeviceId, Vec<u8>)>,
    notifications: HashMap<DeviceId, mpsc::UnboundedSender<Vec<u8>>>,
    disconnects: Vec<DeviceId>,
}

/// Central radio driven by the test
pub struct MockCentralRadio {
    script: Mutex<CentralScript>,
    events_tx: mpsc::UnboundedSender<CentralRadioEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<CentralRadioEvent>>>,
}

impl MockCentralRadio {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            script: Mutex::new(CentralScript::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Register a nearby advertiser whose name characteristic returns `hello`
    pub fn add_advertiser(&self, device: &str, hello: &Hello) {
        self.script
            .lock()
            .unwrap()
            .advertisers
            .insert(DeviceId::from(device), hello.encode().unwrap());
    }

    pub fn fail_connect(&self, device: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_connects
            .insert(DeviceId::from(device));
    }

    /// The adapter reports `device` in scan results
    pub fn discover(&self, device: &str) {
        let _ = self.events_tx.send(CentralRadioEvent::Discovered {
            device: DeviceId::from(device),
            local_name: None,
        });
    }

    /// Deliver a notification on the message characteristic
    pub fn push_notification(&self, device: &str, bytes: Vec<u8>) {
        let script = self.script.lock().unwrap();
        let sender = script
            .notifications
            .get(&DeviceId::from(device))
            .expect("device not subscribed");
        sender.send(bytes).unwrap();
    }

    /// Fragment and deliver a whole envelope
    pub fn deliver(&self, device: &str, envelope: &MessageEnvelope, mtu: usize) {
        for fragment in fragment_payload(&envelope.encode().unwrap(), mtu).unwrap() {
            self.push_notification(device, fragment);
        }
    }

    /// The remote side goes out of range
    pub fn lose_link(&self, device: &str) {
        let device = DeviceId::from(device);
        self.script.lock().unwrap().notifications.remove(&device);
        let _ = self
            .events_tx
            .send(CentralRadioEvent::Disconnected { device });
    }

    pub fn is_scanning(&self) -> bool {
        self.script.lock().unwrap().scanning
    }

    pub fn scan_starts(&self) -> usize {
        self.script.lock().unwrap().scan_starts
    }

    pub fn connect_attempts(&self, device: &str) -> usize {
        let device = DeviceId::from(device);
        self.script
            .lock()
            .unwrap()
            .connect_attempts
            .iter()
            .filter(|d| **d == device)
            .count()
    }

    pub fn written_hellos(&self, device: &str) -> Vec<Hello> {
        let device = DeviceId::from(device);
        self.script
            .lock()
            .unwrap()
            .written_hellos
            .iter()
            .filter(|(d, _)| *d == device)
            .map(|(_, bytes)| Hello::decode(bytes).unwrap())
            .collect()
    }

    pub fn was_disconnected(&self, device: &str) -> bool {
        self.script
            .lock()
            .unwrap()
            .disconnects
            .contains(&DeviceId::from(device))
    }
}

#[async_trait]
impl CentralRadio for MockCentralRadio {
    async fn start_scan(&self) -> Result<(), RadioError> {
        let mut script = self.script.lock().unwrap();
        script.scanning = true;
        script.scan_starts += 1;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.script.lock().unwrap().scanning = false;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, CentralRadioEvent>, RadioError> {
        let rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RadioError::Backend {
                reason: "events already taken".to_string(),
            })?;
        Ok(unbounded_stream(rx))
    }

    async fn connect(&self, device: &DeviceId) -> Result<(), RadioError> {
        let mut script = self.script.lock().unwrap();
        script.connect_attempts.push(device.clone());
        if script.failing_connects.contains(device) {
            return Err(RadioError::Backend {
                reason: "peer out of range".to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, device: &DeviceId) -> Result<BoxStream<'static, Vec<u8>>, RadioError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script
            .lock()
            .unwrap()
            .notifications
            .insert(device.clone(), tx);
        Ok(unbounded_stream(rx))
    }

    async fn read_hello(&self, device: &DeviceId) -> Result<Vec<u8>, RadioError> {
        self.script
            .lock()
            .unwrap()
            .advertisers
            .get(device)
            .cloned()
            .ok_or_else(|| RadioError::Backend {
                reason: "no name characteristic".to_string(),
            })
    }

    async fn write_hello(&self, device: &DeviceId, hello: &[u8]) -> Result<(), RadioError> {
        self.script
            .lock()
            .unwrap()
            .written_hellos
            .push((device.clone(), hello.to_vec()));
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), RadioError> {
        let mut script = self.script.lock().unwrap();
        script.notifications.remove(device);
        script.disconnects.push(device.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Mock Peripheral Radio
// ----------------------------------------------------------------------------

#[derive(Default)]
struct PeripheralScript {
    advertising: bool,
    adverts: Vec<(Hello, String)>,
    delivered: HashMap<DeviceId, Vec<Vec<u8>>>,
    /// Writes to the device succeed this many more times, then fail
    write_budget: HashMap<DeviceId, usize>,
}

/// Peripheral radio driven by the test
pub struct MockPeripheralRadio {
    script: Mutex<PeripheralScript>,
    events_tx: mpsc::UnboundedSender<PeripheralRadioEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<PeripheralRadioEvent>>>,
}

impl MockPeripheralRadio {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            script: Mutex::new(PeripheralScript::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// A central subscribes and writes its hello
    pub fn connect_central(&self, device: &str, hello: &Hello) {
        let device = DeviceId::from(device);
        let _ = self.events_tx.send(PeripheralRadioEvent::Subscribed {
            device: device.clone(),
        });
        self.write_hello(device.as_str(), hello);
    }

    pub fn write_hello(&self, device: &str, hello: &Hello) {
        let _ = self.events_tx.send(PeripheralRadioEvent::HelloWritten {
            device: DeviceId::from(device),
            bytes: hello.encode().unwrap(),
        });
    }

    pub fn unsubscribe(&self, device: &str) {
        let _ = self.events_tx.send(PeripheralRadioEvent::Unsubscribed {
            device: DeviceId::from(device),
        });
    }

    /// Let `successes` more writes to `device` through, then fail
    pub fn fail_writes_after(&self, device: &str, successes: usize) {
        self.script
            .lock()
            .unwrap()
            .write_budget
            .insert(DeviceId::from(device), successes);
    }

    pub fn is_advertising(&self) -> bool {
        self.script.lock().unwrap().advertising
    }

    pub fn adverts(&self) -> Vec<(Hello, String)> {
        self.script.lock().unwrap().adverts.clone()
    }

    pub fn delivered(&self, device: &str) -> Vec<Vec<u8>> {
        self.script
            .lock()
            .unwrap()
            .delivered
            .get(&DeviceId::from(device))
            .cloned()
            .unwrap_or_default()
    }

    /// Reassemble everything `device` received
    pub fn received_envelopes(&self, device: &str) -> Vec<MessageEnvelope> {
        let mut reassembler = Reassembler::default();
        let sender = PeerId::from_bytes([0; 16]);
        self.delivered(device)
            .iter()
            .filter_map(|chunk| reassembler.ingest(sender, chunk, Timestamp::new(0)).unwrap())
            .collect()
    }
}

#[async_trait]
impl PeripheralRadio for MockPeripheralRadio {
    async fn start_advertising(&self, hello: &[u8], local_name: &str) -> Result<(), RadioError> {
        let mut script = self.script.lock().unwrap();
        script.advertising = true;
        script
            .adverts
            .push((Hello::decode(hello).unwrap(), local_name.to_string()));
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), RadioError> {
        self.script.lock().unwrap().advertising = false;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, PeripheralRadioEvent>, RadioError> {
        let rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RadioError::Backend {
                reason: "events already taken".to_string(),
            })?;
        Ok(unbounded_stream(rx))
    }

    async fn notify(&self, device: &DeviceId, bytes: &[u8]) -> Result<(), RadioError> {
        let mut script = self.script.lock().unwrap();
        if let Some(budget) = script.write_budget.get_mut(device) {
            if *budget == 0 {
                return Err(RadioError::WriteFailure {
                    device: device.to_string(),
                    reason: "link dropped".to_string(),
                });
            }
            *budget -= 1;
        }
        script
            .delivered
            .entry(device.clone())
            .or_default()
            .push(bytes.to_vec());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Room Fixture
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

pub fn test_config() -> RoomConfig {
    RoomConfig::default()
        .with_expiry_tick(Duration::from_millis(10))
        .with_mtu(23)
}

/// A room on scripted radios
pub struct TestRoom {
    pub room: ChatRoom,
    pub identity: Arc<StaticIdentity>,
    pub central: Arc<MockCentralRadio>,
    pub peripheral: Arc<MockPeripheralRadio>,
    pub updates: mpsc::UnboundedReceiver<RoomUpdate>,
    pub clock: MockTimeSource,
}

impl TestRoom {
    pub fn start() -> Self {
        Self::start_with(test_config())
    }

    pub fn start_with(config: RoomConfig) -> Self {
        let identity = Arc::new(StaticIdentity::new(local_peer(), "Me"));
        let central = MockCentralRadio::new();
        let peripheral = MockPeripheralRadio::new();
        let clock = MockTimeSource::new_at(1_000_000);
        let (observer, updates) = ChannelObserver::new();

        let room = ChatRoom::builder(identity.clone(), Box::new(observer))
            .with_config(config)
            .with_time_source(Arc::new(clock.clone()))
            .build(central.clone(), peripheral.clone())
            .unwrap();

        Self {
            room,
            identity,
            central,
            peripheral,
            updates,
            clock,
        }
    }

    pub async fn next_update(&mut self) -> RoomUpdate {
        tokio::time::timeout(Duration::from_secs(2), self.updates.recv())
            .await
            .expect("timed out waiting for a room update")
            .expect("observer channel closed")
    }

    /// Skip updates until one matches
    pub async fn wait_for(&mut self, matches: impl Fn(&RoomUpdate) -> bool) -> RoomUpdate {
        loop {
            let update = self.next_update().await;
            if matches(&update) {
                return update;
            }
        }
    }

    /// Let spawned radio tasks run, then check nothing was reported
    pub async fn assert_quiet(&mut self) {
        settle().await;
        // Snapshots are answered after every queued event
        self.room.snapshot().await.unwrap();
        if let Ok(update) = self.updates.try_recv() {
            panic!("unexpected room update: {:?}", update);
        }
    }
}

/// Yield long enough for spawned tasks to drain their queues
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
