//! Room Coordinator
//!
//! The coordinator is the single writer of room state. Radio services push
//! [`RoomEvent`]s into an unbounded channel; one task applies them in order,
//! then notifies the observer and the message store. Split into:
//! - `state`: the room state and counters
//! - `handlers`: pure event handlers producing [`RoomUpdate`]s
//! - `task`: the event loop owning state, observer and store
//!
//! [`RoomUpdate`]: crate::observer::RoomUpdate

pub mod handlers;
pub mod state;
pub mod task;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::envelope::MessageEnvelope;
use crate::errors::{BleuchatError, BleuchatResult};
use crate::presence::PeerIdentity;
use crate::types::{LinkRole, PeerId};

pub use state::{CoordinatorStats, RoomState};
pub use task::RoomCoordinator;

// ----------------------------------------------------------------------------
// Events and Commands
// ----------------------------------------------------------------------------

/// Inputs from the radio services and the local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ScanStarted,
    ScanFinished,
    /// Central-side link finished its hello exchange
    PeerConnected {
        peer: PeerId,
        name: String,
        role: LinkRole,
    },
    PeerDisconnected {
        peer: PeerId,
        role: LinkRole,
    },
    /// A central subscribed to us and sent its hello
    SubscriberJoined { peer: PeerId, name: String },
    SubscriberLeft { peer: PeerId },
    /// One radio write from a peer we are subscribed to
    FragmentReceived { peer: PeerId, bytes: Vec<u8> },
    /// An envelope this device already broadcast
    LocalMessage(MessageEnvelope),
}

impl RoomEvent {
    /// Short label for log lines
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::ScanStarted => "ScanStarted",
            RoomEvent::ScanFinished => "ScanFinished",
            RoomEvent::PeerConnected { .. } => "PeerConnected",
            RoomEvent::PeerDisconnected { .. } => "PeerDisconnected",
            RoomEvent::SubscriberJoined { .. } => "SubscriberJoined",
            RoomEvent::SubscriberLeft { .. } => "SubscriberLeft",
            RoomEvent::FragmentReceived { .. } => "FragmentReceived",
            RoomEvent::LocalMessage(_) => "LocalMessage",
        }
    }
}

/// Requests answered by the coordinator itself
#[derive(Debug)]
pub enum RoomCommand {
    Snapshot(oneshot::Sender<RoomSnapshot>),
    Shutdown,
}

/// Sender half handed to the radio services
pub type RoomEventSender = mpsc::UnboundedSender<RoomEvent>;

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Point-in-time copy of the room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub local_peer: PeerId,
    pub peers: Vec<PeerIdentity>,
    /// Newest first
    pub history: Vec<MessageEnvelope>,
    /// Peers plus the local device
    pub room_size: usize,
    pub pending_fragments: usize,
    pub stats: CoordinatorStats,
}

impl RoomSnapshot {
    pub fn peer(&self, id: &PeerId) -> Option<&PeerIdentity> {
        self.peers.iter().find(|p| p.id == *id)
    }
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Cloneable front of a running coordinator
#[derive(Debug, Clone)]
pub struct RoomHandle {
    local_peer: PeerId,
    events: RoomEventSender,
    commands: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub(crate) fn new(
        local_peer: PeerId,
        events: RoomEventSender,
        commands: mpsc::UnboundedSender<RoomCommand>,
    ) -> Self {
        Self {
            local_peer,
            events,
            commands,
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Queue an event for the coordinator
    pub fn submit(&self, event: RoomEvent) -> BleuchatResult<()> {
        self.events
            .send(event)
            .map_err(|_| BleuchatError::channel_closed("room event"))
    }

    /// Sender for radio services that feed the coordinator directly
    pub fn event_sender(&self) -> RoomEventSender {
        self.events.clone()
    }

    /// Copy of the current room, taken after every event queued before it
    pub async fn snapshot(&self) -> BleuchatResult<RoomSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Snapshot(reply))
            .map_err(|_| BleuchatError::channel_closed("room command"))?;
        response
            .await
            .map_err(|_| BleuchatError::channel_closed("snapshot reply"))
    }

    /// Ask the coordinator to stop after draining queued events
    pub fn shutdown(&self) -> BleuchatResult<()> {
        self.commands
            .send(RoomCommand::Shutdown)
            .map_err(|_| BleuchatError::channel_closed("room command"))
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}
