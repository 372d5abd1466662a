//! Central Scanner
//!
//! Discovers advertisers of the room service during timed scan windows,
//! connects to each new one, exchanges hellos and forwards notification bytes
//! to the room coordinator. Each device moves through
//! `Connecting -> Connected -> Subscribed` and is forgotten on disconnect.
//! Failed attempts are not retried; the device is tried again only if it is
//! rediscovered during a later window.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bleuchat_core::{
    Hello, LinkRole, LinkState, LocalIdentity, PeerId, RadioError, RoomConfig, RoomEvent,
    RoomEventSender,
};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::radio::{CentralRadio, CentralRadioEvent, DeviceId};
use crate::timer::OneShotTimer;

// ----------------------------------------------------------------------------
// Device Links
// ----------------------------------------------------------------------------

/// Bookkeeping for one remote advertiser
#[derive(Debug)]
struct DeviceLink {
    state: LinkState,
    peer: Option<PeerId>,
    /// Connection attempt, then notification pump
    task: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct ScannerState {
    scanning: bool,
    pump: Option<JoinHandle<()>>,
    devices: HashMap<DeviceId, DeviceLink>,
    /// Devices abandoned during the current window
    failed: HashSet<DeviceId>,
}

// ----------------------------------------------------------------------------
// Central Scanner
// ----------------------------------------------------------------------------

/// Central-role service; cheap to clone
#[derive(Clone)]
pub struct CentralScanner {
    inner: Arc<ScannerInner>,
}

struct ScannerInner {
    radio: Arc<dyn CentralRadio>,
    identity: Arc<dyn LocalIdentity>,
    config: RoomConfig,
    events: RoomEventSender,
    state: Mutex<ScannerState>,
    timer: Mutex<OneShotTimer>,
}

impl CentralScanner {
    pub fn new(
        radio: Arc<dyn CentralRadio>,
        identity: Arc<dyn LocalIdentity>,
        config: RoomConfig,
        events: RoomEventSender,
    ) -> Self {
        Self {
            inner: Arc::new(ScannerInner {
                radio,
                identity,
                config,
                events,
                state: Mutex::new(ScannerState::default()),
                timer: Mutex::new(OneShotTimer::new()),
            }),
        }
    }

    /// Open a scan window, or extend the current one
    ///
    /// `ScanStarted` is emitted only when scanning was not already active.
    pub async fn start_scanning(&self, duration: Option<Duration>) -> Result<(), RadioError> {
        self.inner.ensure_pump().await?;
        let window = duration.unwrap_or(self.inner.config.scan_window);

        {
            let mut state = self.inner.state.lock().await;
            if state.scanning {
                debug!("Already scanning, re-arming {:?} window", window);
            } else {
                self.inner.radio.start_scan().await?;
                state.scanning = true;
                state.failed.clear();
                self.inner.emit(RoomEvent::ScanStarted);
                info!("Started scanning for {:?}", window);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.timer.lock().await.arm(window, async move {
            if let Some(inner) = weak.upgrade() {
                inner.timer.lock().await.disarm();
                debug!("Scan window elapsed");
                inner.close_window().await;
            }
        });
        Ok(())
    }

    /// End the scan window early; established links stay up
    pub async fn stop_scanning(&self) {
        self.inner.timer.lock().await.cancel();
        self.inner.close_window().await;
    }

    /// Stop scanning and close every link, reporting each as disconnected
    pub async fn disconnect_all(&self) {
        self.stop_scanning().await;

        let links: Vec<(DeviceId, DeviceLink)> =
            self.inner.state.lock().await.devices.drain().collect();

        for (device, link) in links {
            if let Some(task) = link.task {
                task.abort();
            }
            if let Err(e) = self.inner.radio.disconnect(&device).await {
                debug!("Disconnect of {} failed: {}", device, e);
            }
            if let (LinkState::Subscribed, Some(peer)) = (link.state, link.peer) {
                info!("Disconnected from {} ({})", peer.short(), device);
                self.inner.emit(RoomEvent::PeerDisconnected {
                    peer,
                    role: LinkRole::Central,
                });
            }
        }
    }

    pub async fn is_scanning(&self) -> bool {
        self.inner.state.lock().await.scanning
    }

    /// State of the link to `device`, if it is being tracked
    pub async fn link_state(&self, device: &DeviceId) -> Option<LinkState> {
        self.inner.state.lock().await.devices.get(device).map(|l| l.state)
    }

    /// Peers with a subscribed central-side link
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.inner
            .state
            .lock()
            .await
            .devices
            .values()
            .filter(|l| l.state == LinkState::Subscribed)
            .filter_map(|l| l.peer)
            .collect()
    }
}

impl ScannerInner {
    fn emit(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            debug!("Room coordinator gone, dropping scanner event");
        }
    }

    /// Start consuming adapter events, once
    async fn ensure_pump(self: &Arc<Self>) -> Result<(), RadioError> {
        let mut state = self.state.lock().await;
        if state.pump.is_some() {
            return Ok(());
        }

        let mut stream = self.radio.events().await?;
        let weak = Arc::downgrade(self);
        state.pump = Some(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.handle_radio_event(event).await;
            }
            debug!("Central radio event stream ended");
        }));
        Ok(())
    }

    async fn handle_radio_event(self: &Arc<Self>, event: CentralRadioEvent) {
        match event {
            CentralRadioEvent::Discovered { device, local_name } => {
                self.on_discovered(device, local_name).await
            }
            CentralRadioEvent::Disconnected { device } => self.on_link_lost(&device, true).await,
        }
    }

    async fn close_window(&self) {
        let mut state = self.state.lock().await;
        if !state.scanning {
            return;
        }
        state.scanning = false;
        if let Err(e) = self.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        self.emit(RoomEvent::ScanFinished);
        info!("Scan window closed ({} device(s) tracked)", state.devices.len());
    }

    async fn on_discovered(self: &Arc<Self>, device: DeviceId, local_name: Option<String>) {
        let mut state = self.state.lock().await;
        if !state.scanning {
            debug!("Ignoring {} seen outside a scan window", device);
            return;
        }
        if state.devices.contains_key(&device) {
            return;
        }
        if state.failed.contains(&device) {
            debug!("Skipping {} until the next scan window", device);
            return;
        }

        debug!(
            "Discovered {} ({})",
            device,
            local_name.as_deref().unwrap_or("unnamed")
        );
        let task = tokio::spawn(Self::run_link(Arc::downgrade(self), device.clone()));
        state.devices.insert(
            device,
            DeviceLink {
                state: LinkState::Connecting,
                peer: None,
                task: Some(task),
            },
        );
    }

    /// Connect, handshake, then pump notifications until the link drops
    async fn run_link(weak: Weak<Self>, device: DeviceId) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let handshake = timeout(inner.config.connection_timeout, inner.handshake(&device)).await;
        let (hello, mut notifications) = match handshake {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("{}", e);
                inner.abandon(&device).await;
                return;
            }
            Err(_) => {
                warn!(
                    "Connection to {} timed out after {:?}",
                    device, inner.config.connection_timeout
                );
                inner.abandon(&device).await;
                return;
            }
        };

        if !inner.mark_subscribed(&device, &hello).await {
            if let Err(e) = inner.radio.disconnect(&device).await {
                debug!("Disconnect of {} failed: {}", device, e);
            }
            return;
        }
        drop(inner);

        let peer = hello.peer_id;
        while let Some(bytes) = notifications.next().await {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.emit(RoomEvent::FragmentReceived { peer, bytes });
        }

        if let Some(inner) = weak.upgrade() {
            debug!("Notification stream from {} ended", device);
            inner.on_link_lost(&device, false).await;
        }
    }

    async fn handshake(
        &self,
        device: &DeviceId,
    ) -> Result<(Hello, BoxStream<'static, Vec<u8>>), RadioError> {
        self.radio
            .connect(device)
            .await
            .map_err(|e| discovery_failure(device, e))?;
        self.set_link_state(device, LinkState::Connected).await;

        let notifications = self
            .radio
            .subscribe(device)
            .await
            .map_err(|e| subscription_failure(device, e.to_string()))?;

        let bytes = self
            .radio
            .read_hello(device)
            .await
            .map_err(|e| subscription_failure(device, e.to_string()))?;
        let hello = Hello::decode(&bytes)
            .map_err(|e| subscription_failure(device, format!("unreadable hello: {}", e)))?;

        let ours = self
            .identity
            .hello()
            .encode()
            .map_err(|e| subscription_failure(device, e.to_string()))?;
        self.radio
            .write_hello(device, &ours)
            .await
            .map_err(|e| subscription_failure(device, e.to_string()))?;

        Ok((hello, notifications))
    }

    async fn set_link_state(&self, device: &DeviceId, link_state: LinkState) {
        if let Some(link) = self.state.lock().await.devices.get_mut(device) {
            link.state = link_state;
        }
    }

    /// Promote a link after its handshake and announce the peer
    ///
    /// Returns false if the link was torn down meanwhile or leads to ourselves.
    async fn mark_subscribed(&self, device: &DeviceId, hello: &Hello) -> bool {
        let mut state = self.state.lock().await;

        if hello.peer_id == self.identity.peer_id() {
            debug!("{} is our own advertisement, dropping", device);
            state.devices.remove(device);
            state.failed.insert(device.clone());
            return false;
        }

        match state.devices.get_mut(device) {
            Some(link) if matches!(link.state, LinkState::Connecting | LinkState::Connected) => {
                link.state = LinkState::Subscribed;
                link.peer = Some(hello.peer_id);
                info!(
                    "Subscribed to {} ({}) via {}",
                    hello.display_name,
                    hello.peer_id.short(),
                    device
                );
                self.emit(RoomEvent::PeerConnected {
                    peer: hello.peer_id,
                    name: hello.display_name.clone(),
                    role: LinkRole::Central,
                });
                true
            }
            _ => {
                debug!("Link to {} went away during handshake", device);
                false
            }
        }
    }

    /// Drop a device that never reached Subscribed
    async fn abandon(&self, device: &DeviceId) {
        {
            let mut state = self.state.lock().await;
            state.devices.remove(device);
            state.failed.insert(device.clone());
        }
        if let Err(e) = self.radio.disconnect(device).await {
            debug!("Cleanup disconnect of {} failed: {}", device, e);
        }
        info!("{} dropped back to undiscovered", device);
    }

    async fn on_link_lost(&self, device: &DeviceId, abort_task: bool) {
        let Some(link) = self.state.lock().await.devices.remove(device) else {
            return;
        };
        if abort_task {
            if let Some(task) = link.task {
                task.abort();
            }
        }

        match (link.state, link.peer) {
            (LinkState::Subscribed, Some(peer)) => {
                info!("Lost central-side link to {} ({})", peer.short(), device);
                self.emit(RoomEvent::PeerDisconnected {
                    peer,
                    role: LinkRole::Central,
                });
            }
            (state, _) => debug!("{} disconnected while {:?}", device, state),
        }
    }
}

impl Drop for ScannerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
        for link in state.devices.values_mut() {
            if let Some(task) = link.task.take() {
                task.abort();
            }
        }
    }
}

fn discovery_failure(device: &DeviceId, error: RadioError) -> RadioError {
    match error {
        RadioError::DiscoveryFailure { .. } => error,
        other => RadioError::DiscoveryFailure {
            device: device.to_string(),
            reason: other.to_string(),
        },
    }
}

fn subscription_failure(device: &DeviceId, reason: String) -> RadioError {
    RadioError::SubscriptionFailure {
        device: device.to_string(),
        reason,
    }
}
