//! BleuChat Core Room Protocol
//!
//! Radio-independent half of BleuChat: message envelopes and their fragment
//! framing, per-peer reassembly, duplicate suppression, presence tracking and
//! the single-writer room coordinator. The radio services in `bleuchat-ble`
//! feed this crate with [`RoomEvent`]s.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod envelope;
pub mod errors;
pub mod identity;
pub mod observer;
pub mod presence;
pub mod reassembler;
pub mod store;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::RoomConfig;
pub use coordinator::{
    CoordinatorStats, RoomCoordinator, RoomEvent, RoomEventSender, RoomHandle, RoomSnapshot,
};
pub use dedup::FingerprintCache;
pub use envelope::{Hello, MessageEnvelope, MessageKind};
pub use errors::{BleuchatError, BleuchatResult, FragmentError, RadioError};
pub use identity::{LocalIdentity, StaticIdentity};
pub use observer::{ChannelObserver, RoomObserver, RoomUpdate};
pub use presence::{PeerIdentity, PresenceChange, PresenceTracker};
pub use reassembler::Reassembler;
pub use store::{MemoryMessageStore, MessageStore};
pub use types::{
    Fingerprint, LinkRole, LinkState, PeerId, SystemTimeSource, TimeSource, Timestamp,
};
pub use wire::fragment_payload;
