//! Room configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::errors::{BleuchatError, BleuchatResult};
use crate::reassembler::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_ENVELOPE_SIZE};
use crate::wire::{FIRST_HEADER_LEN, MAX_PAYLOAD_LEN};

/// ATT payload available with the common 185-byte negotiated MTU
pub const DEFAULT_MTU: usize = 182;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Tunables shared by the radio services and the room coordinator
///
/// Durations are written as integer milliseconds when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// How long one scan window stays open
    #[serde(with = "millis")]
    pub scan_window: Duration,
    /// How long one advertise window stays open
    #[serde(with = "millis")]
    pub advertise_window: Duration,
    /// Upper bound on a single connect-and-handshake attempt
    #[serde(with = "millis")]
    pub connection_timeout: Duration,
    /// Silence after which a partial message is abandoned
    #[serde(with = "millis")]
    pub fragment_idle_timeout: Duration,
    /// Period of the coordinator's fragment expiry sweep
    #[serde(with = "millis")]
    pub expiry_tick: Duration,
    /// Bytes available per radio write, headers included
    pub mtu: usize,
    /// Largest envelope a peer may declare
    pub max_envelope_size: usize,
    /// Number of fingerprints kept for duplicate suppression
    pub dedup_capacity: usize,
    /// Number of messages kept in memory
    pub history_limit: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(8),
            advertise_window: Duration::from_secs(8),
            connection_timeout: Duration::from_secs(10),
            fragment_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            expiry_tick: Duration::from_secs(1),
            mtu: DEFAULT_MTU,
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            history_limit: 500,
        }
    }
}

impl RoomConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan window
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    /// Set advertise window
    pub fn with_advertise_window(mut self, window: Duration) -> Self {
        self.advertise_window = window;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set fragment idle timeout
    pub fn with_fragment_idle_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_idle_timeout = timeout;
        self
    }

    /// Set expiry sweep period
    pub fn with_expiry_tick(mut self, tick: Duration) -> Self {
        self.expiry_tick = tick;
        self
    }

    /// Set MTU
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set maximum envelope size
    pub fn with_max_envelope_size(mut self, size: usize) -> Self {
        self.max_envelope_size = size;
        self
    }

    /// Set dedup capacity
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// Set history limit
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Reject settings the protocol cannot work with
    pub fn validate(&self) -> BleuchatResult<()> {
        let invalid = |reason: &str| {
            Err(BleuchatError::Configuration {
                reason: reason.to_string(),
            })
        };

        if self.mtu <= FIRST_HEADER_LEN {
            return invalid("mtu must leave room for the fragment header");
        }
        if self.max_envelope_size == 0 || self.max_envelope_size > MAX_PAYLOAD_LEN {
            return invalid("max_envelope_size must be between 1 and 65535");
        }
        if self.scan_window.is_zero() || self.advertise_window.is_zero() {
            return invalid("scan and advertise windows must be non-zero");
        }
        if self.connection_timeout.is_zero() {
            return invalid("connection_timeout must be non-zero");
        }
        if self.fragment_idle_timeout.is_zero() || self.expiry_tick.is_zero() {
            return invalid("fragment_idle_timeout and expiry_tick must be non-zero");
        }
        if self.dedup_capacity == 0 {
            return invalid("dedup_capacity must be at least 1");
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
