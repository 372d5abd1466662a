//! Room event handlers
//!
//! Each handler mutates [`RoomState`] for one event and returns the observer
//! updates it produced. Every `RoomUpdate::Message` returned here is an
//! accepted envelope that the task also persists.

use tracing::{debug, warn};

use crate::envelope::{MessageEnvelope, MessageKind};
use crate::errors::BleuchatResult;
use crate::observer::RoomUpdate;
use crate::presence::PresenceChange;
use crate::types::{LinkRole, PeerId, Timestamp};

use super::state::RoomState;
use super::RoomEvent;

/// Event handlers for the coordinator task
pub struct EventHandlers;

impl EventHandlers {
    /// Apply one event
    pub fn handle_event(
        state: &mut RoomState,
        event: RoomEvent,
        now: Timestamp,
    ) -> BleuchatResult<Vec<RoomUpdate>> {
        state.stats.events_processed += 1;

        match event {
            RoomEvent::ScanStarted => Ok(vec![RoomUpdate::ScanStarted]),
            RoomEvent::ScanFinished => Ok(vec![RoomUpdate::ScanFinished]),
            RoomEvent::PeerConnected { peer, name, role } => {
                Ok(Self::handle_link_up(state, peer, &name, role, now))
            }
            RoomEvent::SubscriberJoined { peer, name } => {
                Ok(Self::handle_link_up(state, peer, &name, LinkRole::Peripheral, now))
            }
            RoomEvent::PeerDisconnected { peer, role } => {
                Ok(Self::handle_link_down(state, peer, role, now))
            }
            RoomEvent::SubscriberLeft { peer } => {
                Ok(Self::handle_link_down(state, peer, LinkRole::Peripheral, now))
            }
            RoomEvent::FragmentReceived { peer, bytes } => {
                Self::handle_fragment(state, peer, &bytes, now)
            }
            RoomEvent::LocalMessage(envelope) => Ok(Self::handle_local_message(state, envelope)),
        }
    }

    /// Link established through either role
    pub fn handle_link_up(
        state: &mut RoomState,
        peer: PeerId,
        name: &str,
        role: LinkRole,
        now: Timestamp,
    ) -> Vec<RoomUpdate> {
        if peer == state.local_peer {
            debug!("Ignoring {} link to our own id", role);
            return Vec::new();
        }
        let change = state.presence.link_up(peer, name, role, now);
        Self::apply_presence(state, change)
    }

    /// Link lost through either role
    pub fn handle_link_down(
        state: &mut RoomState,
        peer: PeerId,
        role: LinkRole,
        now: Timestamp,
    ) -> Vec<RoomUpdate> {
        // Fragments only ever arrive over our central-side subscription
        if role == LinkRole::Central && state.reassembler.discard(&peer) {
            debug!("Discarded partial message from disconnected {}", peer.short());
        }
        let change = state.presence.link_down(peer, role, now);
        Self::apply_presence(state, change)
    }

    /// Feed a fragment to the reassembler and accept the result
    pub fn handle_fragment(
        state: &mut RoomState,
        peer: PeerId,
        bytes: &[u8],
        now: Timestamp,
    ) -> BleuchatResult<Vec<RoomUpdate>> {
        // A late notification can trail the disconnect that removed the link
        let linked = state
            .presence
            .get(&peer)
            .is_some_and(|identity| identity.links.central);
        if !linked {
            state.stats.unlinked_fragments += 1;
            state.reassembler.discard(&peer);
            debug!("Dropping fragment from {} without a central link", peer.short());
            return Ok(Vec::new());
        }
        state.presence.touch(&peer, now);

        let envelope = match state.reassembler.ingest(peer, bytes, now) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => {
                state.stats.protocol_errors += 1;
                return Err(e.into());
            }
        };

        Ok(Self::accept_remote(state, peer, envelope))
    }

    /// Dedup and record an envelope received from a peer
    pub fn accept_remote(
        state: &mut RoomState,
        from: PeerId,
        envelope: MessageEnvelope,
    ) -> Vec<RoomUpdate> {
        if envelope.kind != MessageKind::Chat {
            warn!(
                "Ignoring {:?} envelope from {}; status is derived locally",
                envelope.kind,
                from.short()
            );
            return Vec::new();
        }
        if envelope.sender_id == state.local_peer {
            debug!("Dropping echo of our own message via {}", from.short());
            return Vec::new();
        }
        if !state.dedup.insert(envelope.fingerprint()) {
            state.stats.duplicates_dropped += 1;
            debug!("Dropping duplicate {} from {}", envelope.fingerprint(), from.short());
            return Vec::new();
        }
        if envelope.sender_id != from {
            debug!(
                "Envelope from {} carries sender {}",
                from.short(),
                envelope.sender_id.short()
            );
        }

        vec![Self::record(state, envelope)]
    }

    /// Record an envelope this device just broadcast
    pub fn handle_local_message(state: &mut RoomState, envelope: MessageEnvelope) -> Vec<RoomUpdate> {
        let envelope = envelope.into_self();
        state.dedup.insert(envelope.fingerprint());
        vec![Self::record(state, envelope)]
    }

    /// Drop partial messages that have been silent too long
    pub fn handle_expiry_tick(state: &mut RoomState, now: Timestamp) {
        let expired = state.reassembler.expire_idle(now);
        if !expired.is_empty() {
            state.stats.buffers_expired += expired.len() as u64;
            debug!("Expired {} idle fragment buffer(s)", expired.len());
        }
    }

    fn apply_presence(state: &mut RoomState, change: PresenceChange) -> Vec<RoomUpdate> {
        match change {
            PresenceChange::Joined { peer, name, status } => {
                vec![
                    RoomUpdate::PeerJoined { name, peer },
                    Self::record(state, status),
                ]
            }
            PresenceChange::Renamed { status, .. } => vec![Self::record(state, status)],
            PresenceChange::Left { peer, status, .. } => {
                state.reassembler.discard(&peer);
                vec![Self::record(state, status), RoomUpdate::PeerLeft { peer }]
            }
            PresenceChange::Unchanged => Vec::new(),
        }
    }

    fn record(state: &mut RoomState, envelope: MessageEnvelope) -> RoomUpdate {
        state.stats.messages_accepted += 1;
        state.push_history(envelope.clone());
        RoomUpdate::Message(envelope)
    }
}
