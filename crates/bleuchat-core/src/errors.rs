//! Error types for the BleuChat room protocol
//!
//! Radio-layer failures are local: each one is logged and absorbed into the
//! presence model by whoever observes it. Only channel closure is treated as
//! terminal by the room coordinator.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Protocol errors raised while reassembling fragments
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("Empty fragment")]
    EmptyFragment,
    #[error("Unknown fragment flag {flag:#04x}")]
    UnknownFlag { flag: u8 },
    #[error("Truncated fragment header ({actual} bytes)")]
    TruncatedHeader { actual: usize },
    #[error("Declared length {declared} outside 1..={max}")]
    InvalidLength { declared: usize, max: usize },
    #[error("Continuation fragment without a message in progress")]
    OrphanContinuation,
    #[error("Fragment overflows declared length ({received} > {declared})")]
    Overflow { received: usize, declared: usize },
    #[error("Stale continuation after {idle_ms}ms of silence")]
    Stale { idle_ms: u64 },
    #[error("Payload too large to fragment: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("MTU {mtu} too small for fragment header")]
    MtuTooSmall { mtu: usize },
    #[error("Undecodable envelope: {reason}")]
    Undecodable { reason: String },
}

/// Failures reported by the radio-facing services
#[derive(Debug, Clone, thiserror::Error)]
pub enum RadioError {
    #[error("Connection to {device} failed: {reason}")]
    DiscoveryFailure { device: String, reason: String },
    #[error("Subscription to {device} failed: {reason}")]
    SubscriptionFailure { device: String, reason: String },
    #[error("Write to {device} failed: {reason}")]
    WriteFailure { device: String, reason: String },
    #[error("Timer cancelled")]
    TimerCancelled,
    #[error("BLE adapter not available: {reason}")]
    AdapterUnavailable { reason: String },
    #[error("Radio backend error: {reason}")]
    Backend { reason: String },
}

impl RadioError {
    /// Whether this outcome is part of normal operation rather than a fault
    pub fn is_expected(&self) -> bool {
        matches!(self, RadioError::TimerCancelled)
    }
}

// ----------------------------------------------------------------------------
// Top-level Error
// ----------------------------------------------------------------------------

/// Core error type for the BleuChat room protocol
#[derive(Debug, thiserror::Error)]
pub enum BleuchatError {
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Fragment protocol error: {0}")]
    Fragment(#[from] FragmentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {reason}")]
    Storage { reason: String },

    /// The coordinator or an observer channel went away
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Refusing to send an empty message")]
    EmptyMessage,
}

impl BleuchatError {
    /// Shorthand for a closed-channel error
    pub fn channel_closed(what: &str) -> Self {
        BleuchatError::Channel {
            message: format!("{} channel closed", what),
        }
    }
}

/// Result alias used across the workspace
pub type BleuchatResult<T> = std::result::Result<T, BleuchatError>;
