//! Presence tracking for the room
//!
//! Peers are keyed by the [`PeerId`] they announce in their hello, so a device
//! reached through both radio roles is one person in the room. A peer exists
//! only while at least one of its links is active.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::envelope::MessageEnvelope;
use crate::types::{LinkRole, LinkState, PeerId, Timestamp};

// ----------------------------------------------------------------------------
// Peer Identity
// ----------------------------------------------------------------------------

/// Active radio links to one peer, one flag per role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSet {
    pub central: bool,
    pub peripheral: bool,
}

impl LinkSet {
    fn slot(&mut self, role: LinkRole) -> &mut bool {
        match role {
            LinkRole::Central => &mut self.central,
            LinkRole::Peripheral => &mut self.peripheral,
        }
    }

    pub fn contains(&self, role: LinkRole) -> bool {
        match role {
            LinkRole::Central => self.central,
            LinkRole::Peripheral => self.peripheral,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.central && !self.peripheral
    }

    pub fn count(&self) -> usize {
        self.central as usize + self.peripheral as usize
    }
}

/// A person currently in the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub id: PeerId,
    pub display_name: String,
    pub links: LinkSet,
    pub last_activity: Timestamp,
}

impl PeerIdentity {
    fn new(id: PeerId, display_name: String, role: LinkRole, now: Timestamp) -> Self {
        let mut links = LinkSet::default();
        *links.slot(role) = true;
        Self {
            id,
            display_name,
            links,
            last_activity: now,
        }
    }

    /// Tracked peers are always subscribed through at least one role
    pub fn connection_state(&self) -> LinkState {
        if self.links.is_empty() {
            LinkState::Disconnected
        } else {
            LinkState::Subscribed
        }
    }
}

// ----------------------------------------------------------------------------
// Presence Changes
// ----------------------------------------------------------------------------

/// Outcome of a link event, with the status envelope to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Joined {
        peer: PeerId,
        name: String,
        status: MessageEnvelope,
    },
    Renamed {
        peer: PeerId,
        old: String,
        new: String,
        status: MessageEnvelope,
    },
    Left {
        peer: PeerId,
        name: String,
        status: MessageEnvelope,
    },
    Unchanged,
}

impl PresenceChange {
    /// Status envelope carried by this change, if any
    pub fn status(&self) -> Option<&MessageEnvelope> {
        match self {
            PresenceChange::Joined { status, .. }
            | PresenceChange::Renamed { status, .. }
            | PresenceChange::Left { status, .. } => Some(status),
            PresenceChange::Unchanged => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Presence Tracker
// ----------------------------------------------------------------------------

/// Who is in the room, and through which links
#[derive(Debug, Default)]
pub struct PresenceTracker {
    peers: HashMap<PeerId, PeerIdentity>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link to `peer` became usable
    pub fn link_up(
        &mut self,
        peer: PeerId,
        name: &str,
        role: LinkRole,
        now: Timestamp,
    ) -> PresenceChange {
        match self.peers.get_mut(&peer) {
            None => {
                info!("{} ({}) joined via {} link", name, peer.short(), role);
                self.peers
                    .insert(peer, PeerIdentity::new(peer, name.to_string(), role, now));
                PresenceChange::Joined {
                    peer,
                    name: name.to_string(),
                    status: MessageEnvelope::joined(peer, name, now),
                }
            }
            Some(identity) => {
                *identity.links.slot(role) = true;
                identity.last_activity = now;

                if identity.display_name == name {
                    debug!("{} also reachable via {} link", peer.short(), role);
                    return PresenceChange::Unchanged;
                }

                let old = std::mem::replace(&mut identity.display_name, name.to_string());
                info!("{} renamed from {} to {}", peer.short(), old, name);
                PresenceChange::Renamed {
                    peer,
                    status: MessageEnvelope::renamed(peer, &old, name, now),
                    old,
                    new: name.to_string(),
                }
            }
        }
    }

    /// A link to `peer` went away
    pub fn link_down(&mut self, peer: PeerId, role: LinkRole, now: Timestamp) -> PresenceChange {
        let Some(identity) = self.peers.get_mut(&peer) else {
            return PresenceChange::Unchanged;
        };

        *identity.links.slot(role) = false;
        if !identity.links.is_empty() {
            debug!("{} lost {} link, still present", peer.short(), role);
            return PresenceChange::Unchanged;
        }

        let Some(identity) = self.peers.remove(&peer) else {
            return PresenceChange::Unchanged;
        };
        info!("{} ({}) left the room", identity.display_name, peer.short());
        PresenceChange::Left {
            peer,
            status: MessageEnvelope::left(peer, identity.display_name.clone(), now),
            name: identity.display_name,
        }
    }

    /// Refresh a peer's activity time on inbound traffic
    pub fn touch(&mut self, peer: &PeerId, now: Timestamp) {
        if let Some(identity) = self.peers.get_mut(peer) {
            identity.last_activity = now;
        }
    }

    /// Drop every peer, returning a `Left` change for each
    pub fn clear(&mut self, now: Timestamp) -> Vec<PresenceChange> {
        let ids: Vec<PeerId> = self.peers.keys().copied().collect();
        ids.into_iter()
            .filter_map(|peer| {
                let identity = self.peers.remove(&peer)?;
                Some(PresenceChange::Left {
                    peer,
                    status: MessageEnvelope::left(peer, identity.display_name.clone(), now),
                    name: identity.display_name,
                })
            })
            .collect()
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerIdentity> {
        self.peers.get(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerIdentity> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// People in the room, counting the local device
    pub fn room_size(&self) -> usize {
        self.peers.len() + 1
    }
}
