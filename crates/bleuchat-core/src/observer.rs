//! Observer interface toward the presentation layer
//!
//! The coordinator calls the observer synchronously after each state change.
//! [`ChannelObserver`] turns those calls into [`RoomUpdate`] values for an
//! async consumer.

use tokio::sync::mpsc;
use tracing::debug;

use crate::envelope::MessageEnvelope;
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Observer Trait
// ----------------------------------------------------------------------------

/// Receives room changes, in the order the coordinator applied them
pub trait RoomObserver: Send {
    fn on_scan_started(&mut self) {}

    fn on_scan_finished(&mut self) {}

    /// Called once per accepted, non-duplicate envelope
    fn on_message(&mut self, message: &MessageEnvelope);

    fn on_peer_joined(&mut self, name: &str, peer: PeerId);

    fn on_peer_left(&mut self, peer: PeerId);
}

// ----------------------------------------------------------------------------
// Channel Observer
// ----------------------------------------------------------------------------

/// Observer callbacks as values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    ScanStarted,
    ScanFinished,
    Message(MessageEnvelope),
    PeerJoined { name: String, peer: PeerId },
    PeerLeft { peer: PeerId },
}

/// Forwards every callback over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<RoomUpdate>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RoomUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, update: RoomUpdate) {
        if self.sender.send(update).is_err() {
            debug!("Room update receiver dropped");
        }
    }
}

impl RoomObserver for ChannelObserver {
    fn on_scan_started(&mut self) {
        self.forward(RoomUpdate::ScanStarted);
    }

    fn on_scan_finished(&mut self) {
        self.forward(RoomUpdate::ScanFinished);
    }

    fn on_message(&mut self, message: &MessageEnvelope) {
        self.forward(RoomUpdate::Message(message.clone()));
    }

    fn on_peer_joined(&mut self, name: &str, peer: PeerId) {
        self.forward(RoomUpdate::PeerJoined {
            name: name.to_string(),
            peer,
        });
    }

    fn on_peer_left(&mut self, peer: PeerId) {
        self.forward(RoomUpdate::PeerLeft { peer });
    }
}
