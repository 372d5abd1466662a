//! Room state owned by the coordinator task

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::RoomConfig;
use crate::dedup::FingerprintCache;
use crate::envelope::{MessageEnvelope, MessageKind};
use crate::presence::PresenceTracker;
use crate::reassembler::Reassembler;
use crate::types::PeerId;

use super::RoomSnapshot;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub events_processed: u64,
    pub messages_accepted: u64,
    pub duplicates_dropped: u64,
    pub protocol_errors: u64,
    pub buffers_expired: u64,
    /// Fragments from peers without a central-side link
    pub unlinked_fragments: u64,
}

// ----------------------------------------------------------------------------
// Room State
// ----------------------------------------------------------------------------

/// Everything the room knows, mutated only by the coordinator
#[derive(Debug)]
pub struct RoomState {
    pub local_peer: PeerId,
    pub presence: PresenceTracker,
    pub dedup: FingerprintCache,
    /// Newest first, bounded by `history_limit`
    pub history: VecDeque<MessageEnvelope>,
    pub reassembler: Reassembler,
    pub history_limit: usize,
    pub stats: CoordinatorStats,
}

impl RoomState {
    pub fn new(local_peer: PeerId, config: &RoomConfig) -> Self {
        Self {
            local_peer,
            presence: PresenceTracker::new(),
            dedup: FingerprintCache::new(config.dedup_capacity),
            history: VecDeque::new(),
            reassembler: Reassembler::new(config.max_envelope_size, config.fragment_idle_timeout),
            history_limit: config.history_limit.max(1),
            stats: CoordinatorStats::default(),
        }
    }

    /// Seed history from stored messages, oldest first
    ///
    /// Stored chat fingerprints are remembered so a late duplicate of an old
    /// message is still suppressed.
    pub fn seed_history(&mut self, stored: Vec<MessageEnvelope>) {
        for mut message in stored {
            message.is_self = message.sender_id == self.local_peer;
            if message.kind == MessageKind::Chat {
                self.dedup.insert(message.fingerprint());
            }
            self.push_history(message);
        }
    }

    /// Add an accepted message at the front of history
    pub fn push_history(&mut self, message: MessageEnvelope) {
        self.history.push_front(message);
        self.history.truncate(self.history_limit);
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let mut peers: Vec<_> = self.presence.peers().cloned().collect();
        peers.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));

        RoomSnapshot {
            local_peer: self.local_peer,
            peers,
            history: self.history.iter().cloned().collect(),
            room_size: self.presence.room_size(),
            pending_fragments: self.reassembler.pending_count(),
            stats: self.stats,
        }
    }
}
