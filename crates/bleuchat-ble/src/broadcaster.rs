//! Peripheral Broadcaster
//!
//! Advertises the room service during timed windows, tracks centrals that
//! subscribe to the message characteristic and fans outgoing messages out to
//! them as fragment notifications.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bleuchat_core::{
    fragment_payload, BleuchatError, BleuchatResult, FragmentError, Hello, LocalIdentity,
    MessageEnvelope, PeerId, RadioError, RoomConfig, RoomEvent, RoomEventSender, TimeSource,
};
use futures::stream::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::advertised_name;
use crate::radio::{DeviceId, PeripheralRadio, PeripheralRadioEvent};
use crate::timer::OneShotTimer;

// ----------------------------------------------------------------------------
// Subscriber Links
// ----------------------------------------------------------------------------

/// A central connected to our GATT server
///
/// It joins the room once it has both subscribed and written its hello.
#[derive(Debug, Default)]
struct CentralLink {
    subscribed: bool,
    hello: Option<Hello>,
    joined: bool,
}

impl CentralLink {
    fn joined_peer(&self) -> Option<PeerId> {
        match (&self.hello, self.joined) {
            (Some(hello), true) => Some(hello.peer_id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BroadcasterState {
    advertising: bool,
    /// Hello announced for the current advertising session
    session: Option<Hello>,
    pump: Option<JoinHandle<()>>,
    links: HashMap<DeviceId, CentralLink>,
}

// ----------------------------------------------------------------------------
// Peripheral Broadcaster
// ----------------------------------------------------------------------------

/// Peripheral-role service; cheap to clone
#[derive(Clone)]
pub struct PeripheralBroadcaster {
    inner: Arc<BroadcasterInner>,
}

struct BroadcasterInner {
    radio: Arc<dyn PeripheralRadio>,
    identity: Arc<dyn LocalIdentity>,
    config: RoomConfig,
    events: RoomEventSender,
    time_source: Arc<dyn TimeSource>,
    state: Mutex<BroadcasterState>,
    timer: Mutex<OneShotTimer>,
    /// Keeps the fragments of one message contiguous on the air
    send_lock: Mutex<()>,
}

impl PeripheralBroadcaster {
    pub fn new(
        radio: Arc<dyn PeripheralRadio>,
        identity: Arc<dyn LocalIdentity>,
        config: RoomConfig,
        events: RoomEventSender,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                radio,
                identity,
                config,
                events,
                time_source,
                state: Mutex::new(BroadcasterState::default()),
                timer: Mutex::new(OneShotTimer::new()),
                send_lock: Mutex::new(()),
            }),
        }
    }

    /// Open an advertising window, or extend the current one
    ///
    /// The display name is read from the identity once per session. On
    /// platforms without advertising support this logs and does nothing.
    pub async fn start_advertising(&self, duration: Option<Duration>) -> BleuchatResult<()> {
        if !self.inner.radio.supports_advertising() {
            warn!("Advertising not supported on this platform, running scan-only");
            return Ok(());
        }
        self.inner.ensure_pump().await?;
        let window = duration.unwrap_or(self.inner.config.advertise_window);

        {
            let mut state = self.inner.state.lock().await;
            if state.advertising {
                debug!("Already advertising, re-arming {:?} window", window);
            } else {
                let hello = self.inner.identity.hello();
                let encoded = hello.encode()?;
                self.inner
                    .radio
                    .start_advertising(&encoded, &advertised_name(&hello.display_name))
                    .await?;
                info!(
                    "Advertising as {} ({}) for {:?}",
                    hello.display_name,
                    hello.peer_id.short(),
                    window
                );
                state.advertising = true;
                state.session = Some(hello);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.timer.lock().await.arm(window, async move {
            if let Some(inner) = weak.upgrade() {
                inner.timer.lock().await.disarm();
                debug!("Advertise window elapsed");
                inner.end_session().await;
            }
        });
        Ok(())
    }

    /// Stop advertising and drop every subscriber
    pub async fn stop_advertising(&self) {
        self.inner.timer.lock().await.cancel();
        self.inner.end_session().await;

        let dropped: Vec<(DeviceId, CentralLink)> =
            self.inner.state.lock().await.links.drain().collect();
        for (device, link) in dropped {
            if let Some(peer) = link.joined_peer() {
                info!("Dropping subscriber {} ({})", peer.short(), device);
                self.inner.emit(RoomEvent::SubscriberLeft { peer });
            }
        }
    }

    /// Send a chat message to every subscriber
    ///
    /// The text is trimmed; blank text is rejected. Subscribers whose write
    /// fails are dropped and the remaining ones still receive the message.
    pub async fn send_message(&self, text: &str) -> BleuchatResult<MessageEnvelope> {
        let body = text.trim();
        if body.is_empty() {
            return Err(BleuchatError::EmptyMessage);
        }

        let _guard = self.inner.send_lock.lock().await;

        let (display_name, mut targets) = {
            let state = self.inner.state.lock().await;
            let name = state
                .session
                .as_ref()
                .map(|h| h.display_name.clone())
                .unwrap_or_else(|| self.inner.identity.current_display_name());
            let targets: Vec<DeviceId> = state
                .links
                .iter()
                .filter(|(_, link)| link.subscribed)
                .map(|(device, _)| device.clone())
                .collect();
            (name, targets)
        };

        let envelope = MessageEnvelope::chat(
            self.inner.identity.peer_id(),
            display_name,
            body,
            self.inner.time_source.now(),
        );
        let payload = envelope.encode()?;
        // Receivers reject anything larger than their reassembly limit
        if payload.len() > self.inner.config.max_envelope_size {
            return Err(FragmentError::PayloadTooLarge {
                size: payload.len(),
                max: self.inner.config.max_envelope_size,
            }
            .into());
        }
        let fragments = fragment_payload(&payload, self.inner.config.mtu)?;
        debug!(
            "Sending {} fragment(s) to {} subscriber(s)",
            fragments.len(),
            targets.len()
        );

        for fragment in &fragments {
            if targets.is_empty() {
                break;
            }
            let failed = self.inner.radio.notify_many(&targets, fragment).await;
            for (device, error) in failed {
                warn!("Dropping subscriber {}: {}", device, error);
                targets.retain(|d| d != &device);
                self.inner.drop_link(&device).await;
            }
        }

        self.inner.emit(RoomEvent::LocalMessage(envelope.clone()));
        Ok(envelope)
    }

    pub async fn is_advertising(&self) -> bool {
        self.inner.state.lock().await.advertising
    }

    /// Peers that have joined through our GATT server
    pub async fn subscribers(&self) -> Vec<PeerId> {
        self.inner
            .state
            .lock()
            .await
            .links
            .values()
            .filter_map(CentralLink::joined_peer)
            .collect()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers().await.len()
    }
}

impl BroadcasterInner {
    fn emit(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            debug!("Room coordinator gone, dropping broadcaster event");
        }
    }

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
            debug!("Peripheral radio event stream ended");
        }));
        Ok(())
    }

    /// Stop the advertisement; established subscribers are kept
    async fn end_session(&self) {
        let mut state = self.state.lock().await;
        if !state.advertising {
            return;
        }
        state.advertising = false;
        state.session = None;
        if let Err(e) = self.radio.stop_advertising().await {
            warn!("Failed to stop advertising: {}", e);
        }
        info!(
            "Advertise window closed ({} central(s) linked)",
            state.links.len()
        );
    }

    async fn handle_radio_event(&self, event: PeripheralRadioEvent) {
        match event {
            PeripheralRadioEvent::Subscribed { device } => {
                let mut state = self.state.lock().await;
                debug!("{} subscribed to messages", device);
                let link = state.links.entry(device).or_default();
                link.subscribed = true;
                self.promote(link);
            }
            PeripheralRadioEvent::HelloWritten { device, bytes } => {
                let hello = match Hello::decode(&bytes) {
                    Ok(hello) => hello,
                    Err(e) => {
                        warn!("Ignoring unreadable hello from {}: {}", device, e);
                        return;
                    }
                };
                if hello.peer_id == self.identity.peer_id() {
                    debug!("Ignoring our own hello from {}", device);
                    return;
                }

                let mut state = self.state.lock().await;
                let link = state.links.entry(device).or_default();
                if let Some(previous) = link.joined_peer() {
                    if previous != hello.peer_id {
                        self.emit(RoomEvent::SubscriberLeft { peer: previous });
                        link.joined = false;
                    }
                }
                let renamed = link.joined
                    && link
                        .hello
                        .as_ref()
                        .is_some_and(|h| h.display_name != hello.display_name);
                link.hello = Some(hello);
                if renamed {
                    if let Some(hello) = &link.hello {
                        self.emit(RoomEvent::SubscriberJoined {
                            peer: hello.peer_id,
                            name: hello.display_name.clone(),
                        });
                    }
                } else {
                    self.promote(link);
                }
            }
            PeripheralRadioEvent::Unsubscribed { device } => self.drop_link(&device).await,
        }
    }

    /// Announce a link once it has subscribed and introduced itself
    fn promote(&self, link: &mut CentralLink) {
        if link.joined || !link.subscribed {
            return;
        }
        if let Some(hello) = &link.hello {
            link.joined = true;
            info!(
                "{} ({}) subscribed to us",
                hello.display_name,
                hello.peer_id.short()
            );
            self.emit(RoomEvent::SubscriberJoined {
                peer: hello.peer_id,
                name: hello.display_name.clone(),
            });
        }
    }

    async fn drop_link(&self, device: &DeviceId) {
        let Some(link) = self.state.lock().await.links.remove(device) else {
            return;
        };
        match link.joined_peer() {
            Some(peer) => {
                info!("Subscriber {} ({}) left", peer.short(), device);
                self.emit(RoomEvent::SubscriberLeft { peer });
            }
            None => debug!("{} went away before joining", device),
        }
    }
}

impl Drop for BroadcasterInner {
    fn drop(&mut self) {
        if let Some(pump) = self.state.get_mut().pump.take() {
            pump.abort();
        }
    }
}
