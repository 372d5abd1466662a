//! Message persistence interface
//!
//! The room only appends accepted envelopes and, at startup, reads back the
//! most recent ones. How they are stored is up to the implementation.

use std::collections::VecDeque;

use crate::envelope::MessageEnvelope;
use crate::errors::BleuchatResult;

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Append-only message log
pub trait MessageStore: Send {
    /// Persist one accepted envelope
    fn append_message(&mut self, message: &MessageEnvelope) -> BleuchatResult<()>;

    /// Load up to `limit` of the most recent messages, oldest first
    fn load_recent_messages(&self, limit: usize) -> BleuchatResult<Vec<MessageEnvelope>>;
}

// ----------------------------------------------------------------------------
// In-memory Store
// ----------------------------------------------------------------------------

/// Bounded in-memory store, for tests and ephemeral rooms
#[derive(Debug, Clone)]
pub struct MemoryMessageStore {
    messages: VecDeque<MessageEnvelope>,
    capacity: usize,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl MemoryMessageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Start with previously stored messages, oldest first
    pub fn with_messages(messages: impl IntoIterator<Item = MessageEnvelope>) -> Self {
        let mut store = Self::default();
        for message in messages {
            store.push(message);
        }
        store
    }

    fn push(&mut self, message: MessageEnvelope) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageStore for MemoryMessageStore {
    fn append_message(&mut self, message: &MessageEnvelope) -> BleuchatResult<()> {
        self.push(message.clone());
        Ok(())
    }

    fn load_recent_messages(&self, limit: usize) -> BleuchatResult<Vec<MessageEnvelope>> {
        let skip = self.messages.len().saturating_sub(limit);
        Ok(self.messages.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PeerId, Timestamp};

    fn message(n: u64) -> MessageEnvelope {
        MessageEnvelope::chat(PeerId::from_bytes([1; 16]), "Alice", format!("m{}", n), Timestamp::new(n))
    }

    #[test]
    fn test_recent_messages_oldest_first() {
        let mut store = MemoryMessageStore::default();
        for n in 0..5 {
            store.append_message(&message(n)).unwrap();
        }

        let recent = store.load_recent_messages(3).unwrap();
        let bodies: Vec<_> = recent.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_capacity_bound() {
        let mut store = MemoryMessageStore::new(2);
        for n in 0..4 {
            store.append_message(&message(n)).unwrap();
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.load_recent_messages(10).unwrap()[0].body, "m2");
    }
}
