//! Message envelopes and the connection hello
//!
//! An envelope is the complete, reassembled unit of room traffic. It is
//! encoded as a small JSON record before fragmentation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{BleuchatResult, FragmentError};
use crate::types::{Fingerprint, PeerId, Timestamp};

/// Status body for a peer entering the room
pub const JOINED_BODY: &str = "Joined the room";

/// Status body for a peer leaving the room
pub const LEFT_BODY: &str = "Left the room";

/// Two messages from the same sender closer than this share a header
pub const GROUPING_WINDOW: Duration = Duration::from_secs(5 * 60);

// ----------------------------------------------------------------------------
// Message Kind
// ----------------------------------------------------------------------------

/// What an envelope represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Joined,
    Left,
    Renamed,
}

impl MessageKind {
    /// Status kinds are generated locally by presence tracking
    pub fn is_status(&self) -> bool {
        !matches!(self, MessageKind::Chat)
    }
}

// ----------------------------------------------------------------------------
// Message Envelope
// ----------------------------------------------------------------------------

/// Wire representation of a chat or status message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub sender_id: PeerId,
    /// Display name snapshot at send time
    pub display_name: String,
    pub kind: MessageKind,
    pub body: String,
    #[serde(rename = "timestampEpochMillis")]
    pub timestamp: Timestamp,
    /// Computed locally, never transmitted
    #[serde(skip)]
    pub is_self: bool,
}

impl MessageEnvelope {
    /// Create a chat message
    pub fn chat(
        sender_id: PeerId,
        display_name: impl Into<String>,
        body: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender_id,
            display_name: display_name.into(),
            kind: MessageKind::Chat,
            body: body.into(),
            timestamp,
            is_self: false,
        }
    }

    /// `joined` status for a peer seen for the first time
    pub fn joined(peer: PeerId, name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self::status(peer, name.into(), MessageKind::Joined, JOINED_BODY.to_string(), timestamp)
    }

    /// `renamed` status, attributed to the old name
    pub fn renamed(peer: PeerId, old_name: &str, new_name: &str, timestamp: Timestamp) -> Self {
        Self::status(
            peer,
            old_name.to_string(),
            MessageKind::Renamed,
            format!("Changed their name to {}", new_name),
            timestamp,
        )
    }

    /// `left` status carrying the last known name
    pub fn left(peer: PeerId, name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self::status(peer, name.into(), MessageKind::Left, LEFT_BODY.to_string(), timestamp)
    }

    fn status(
        sender_id: PeerId,
        display_name: String,
        kind: MessageKind,
        body: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender_id,
            display_name,
            kind,
            body,
            timestamp,
            is_self: false,
        }
    }

    /// Mark this envelope as originated by the local device
    pub fn into_self(mut self) -> Self {
        self.is_self = true;
        self
    }

    /// Hash of sender id, body and timestamp, used for duplicate suppression
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.sender_id.as_bytes());
        hasher.update(self.body.as_bytes());
        hasher.update(self.timestamp.as_millis().to_be_bytes());

        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint::new(bytes)
    }

    /// Encode to the JSON payload carried inside fragments
    pub fn encode(&self) -> BleuchatResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a reassembled JSON payload
    pub fn decode(bytes: &[u8]) -> Result<Self, FragmentError> {
        serde_json::from_slice(bytes).map_err(|e| FragmentError::Undecodable {
            reason: e.to_string(),
        })
    }

    /// Whether a presentation layer should show sender and time above this
    /// message, given the message shown just before it
    pub fn starts_new_group(&self, previous: Option<&MessageEnvelope>) -> bool {
        match previous {
            None => true,
            Some(prev) => {
                prev.sender_id != self.sender_id
                    || prev.display_name != self.display_name
                    || self.timestamp.duration_since(prev.timestamp) > GROUPING_WINDOW
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Hello
// ----------------------------------------------------------------------------

/// Handshake record exchanged over the name characteristic on connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub peer_id: PeerId,
    pub display_name: String,
}

impl Hello {
    pub fn new(peer_id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            peer_id,
            display_name: display_name.into(),
        }
    }

    pub fn encode(&self) -> BleuchatResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> BleuchatResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
