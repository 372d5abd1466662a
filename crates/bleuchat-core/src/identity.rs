//! Local device identity

use std::sync::{Arc, RwLock};

use crate::envelope::Hello;
use crate::types::PeerId;

/// Who this device is in the room
///
/// The display name may change between advertising sessions; the radio
/// services read it once per session.
pub trait LocalIdentity: Send + Sync {
    fn peer_id(&self) -> PeerId;

    fn current_display_name(&self) -> String;

    /// Handshake record announcing this identity
    fn hello(&self) -> Hello {
        Hello::new(self.peer_id(), self.current_display_name())
    }
}

/// Identity whose display name can be changed at runtime
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    peer_id: PeerId,
    display_name: Arc<RwLock<String>>,
}

impl StaticIdentity {
    pub fn new(peer_id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            peer_id,
            display_name: Arc::new(RwLock::new(display_name.into())),
        }
    }

    /// Change the name announced from the next advertising session on
    pub fn set_display_name(&self, name: impl Into<String>) {
        match self.display_name.write() {
            Ok(mut guard) => *guard = name.into(),
            Err(poisoned) => *poisoned.into_inner() = name.into(),
        }
    }
}

impl LocalIdentity for StaticIdentity {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn current_display_name(&self) -> String {
        match self.display_name.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
