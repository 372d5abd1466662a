//! Per-peer fragment reassembly
//!
//! Each peer has at most one message in flight. Fragments are appended to that
//! peer's buffer until the declared length is reached, then the payload is
//! decoded into a [`MessageEnvelope`]. Any protocol error discards the buffer
//! but leaves the peer's link alone.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::envelope::MessageEnvelope;
use crate::errors::FragmentError;
use crate::types::{PeerId, Timestamp};
use crate::wire::Fragment;

/// Default upper bound on a declared envelope length
pub const DEFAULT_MAX_ENVELOPE_SIZE: usize = 4096;

/// Default silence after which a partial message is abandoned
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Fragment Buffer
// ----------------------------------------------------------------------------

/// Bytes accumulated for one peer's message in flight
#[derive(Debug)]
struct FragmentBuffer {
    declared_len: usize,
    bytes: Vec<u8>,
    last_fragment: Timestamp,
}

impl FragmentBuffer {
    fn new(declared_len: usize, now: Timestamp) -> Self {
        Self {
            declared_len,
            bytes: Vec::with_capacity(declared_len),
            last_fragment: now,
        }
    }

    /// Append payload, refusing to grow past the declared length
    fn append(&mut self, payload: &[u8], now: Timestamp) -> Result<(), FragmentError> {
        let received = self.bytes.len() + payload.len();
        if received > self.declared_len {
            return Err(FragmentError::Overflow {
                received,
                declared: self.declared_len,
            });
        }
        self.bytes.extend_from_slice(payload);
        self.last_fragment = now;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.bytes.len() == self.declared_len
    }

    fn idle_for(&self, now: Timestamp) -> Duration {
        now.duration_since(self.last_fragment)
    }
}

// ----------------------------------------------------------------------------
// Reassembler
// ----------------------------------------------------------------------------

/// Rebuilds envelopes from the fragments each peer sends
#[derive(Debug)]
pub struct Reassembler {
    buffers: HashMap<PeerId, FragmentBuffer>,
    max_envelope_size: usize,
    idle_timeout: Duration,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENVELOPE_SIZE, DEFAULT_IDLE_TIMEOUT)
    }
}

impl Reassembler {
    pub fn new(max_envelope_size: usize, idle_timeout: Duration) -> Self {
        Self {
            buffers: HashMap::new(),
            max_envelope_size,
            idle_timeout,
        }
    }

    /// Feed one radio write from `peer`
    ///
    /// Returns the decoded envelope once the declared length is reached. On
    /// error the peer's buffer is gone and the next first fragment starts
    /// fresh.
    pub fn ingest(
        &mut self,
        peer: PeerId,
        chunk: &[u8],
        now: Timestamp,
    ) -> Result<Option<MessageEnvelope>, FragmentError> {
        let result = self.ingest_inner(peer, chunk, now);
        if let Err(ref e) = result {
            self.buffers.remove(&peer);
            debug!("Dropped fragment buffer for {}: {}", peer.short(), e);
        }
        result
    }

    fn ingest_inner(
        &mut self,
        peer: PeerId,
        chunk: &[u8],
        now: Timestamp,
    ) -> Result<Option<MessageEnvelope>, FragmentError> {
        match Fragment::parse(chunk)? {
            Fragment::First { total_len, payload } => {
                if total_len == 0 || total_len > self.max_envelope_size {
                    return Err(FragmentError::InvalidLength {
                        declared: total_len,
                        max: self.max_envelope_size,
                    });
                }
                if let Some(old) = self.buffers.remove(&peer) {
                    debug!(
                        "New message from {} replaces partial buffer ({}/{} bytes)",
                        peer.short(),
                        old.bytes.len(),
                        old.declared_len
                    );
                }
                let mut buffer = FragmentBuffer::new(total_len, now);
                buffer.append(payload, now)?;
                self.finish_or_store(peer, buffer)
            }
            Fragment::Continuation { payload } => {
                let mut buffer = self
                    .buffers
                    .remove(&peer)
                    .ok_or(FragmentError::OrphanContinuation)?;
                let idle = buffer.idle_for(now);
                if idle > self.idle_timeout {
                    return Err(FragmentError::Stale {
                        idle_ms: idle.as_millis() as u64,
                    });
                }
                buffer.append(payload, now)?;
                self.finish_or_store(peer, buffer)
            }
        }
    }

    fn finish_or_store(
        &mut self,
        peer: PeerId,
        buffer: FragmentBuffer,
    ) -> Result<Option<MessageEnvelope>, FragmentError> {
        if buffer.is_complete() {
            let envelope = MessageEnvelope::decode(&buffer.bytes)?;
            debug!("Reassembled {} byte envelope from {}", buffer.declared_len, peer.short());
            Ok(Some(envelope))
        } else {
            self.buffers.insert(peer, buffer);
            Ok(None)
        }
    }

    /// Drop buffers that have been silent longer than the idle timeout
    ///
    /// Returns the peers whose buffers were dropped.
    pub fn expire_idle(&mut self, now: Timestamp) -> Vec<PeerId> {
        let expired: Vec<PeerId> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| buffer.idle_for(now) > self.idle_timeout)
            .map(|(peer, _)| *peer)
            .collect();

        for peer in &expired {
            self.buffers.remove(peer);
            debug!("Expired idle fragment buffer for {}", peer.short());
        }
        expired
    }

    /// Forget any partial message from `peer`
    pub fn discard(&mut self, peer: &PeerId) -> bool {
        self.buffers.remove(peer).is_some()
    }

    /// Whether `peer` has a message in flight
    pub fn has_pending(&self, peer: &PeerId) -> bool {
        self.buffers.contains_key(peer)
    }

    pub fn pending_count(&self) -> usize {
        self.buffers.len()
    }
}
