//! Plain-text rendering of room updates

use bleuchat_core::{MessageEnvelope, PeerIdentity, RoomUpdate, Timestamp};

/// `HH:MM` in UTC
pub fn clock_time(timestamp: Timestamp) -> String {
    let minutes = timestamp.as_millis() / 60_000;
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// Turns room updates into terminal lines
///
/// Consecutive chat messages from the same sender share one header line.
#[derive(Debug, Default)]
pub struct ChatFormatter {
    previous: Option<MessageEnvelope>,
}

impl ChatFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_update(&mut self, update: &RoomUpdate) -> Vec<String> {
        match update {
            RoomUpdate::ScanStarted => vec!["-- looking for people nearby".to_string()],
            RoomUpdate::ScanFinished => vec!["-- scan finished".to_string()],
            RoomUpdate::Message(message) => self.format_message(message),
            // Presence is shown through status messages
            RoomUpdate::PeerJoined { .. } | RoomUpdate::PeerLeft { .. } => Vec::new(),
        }
    }

    pub fn format_message(&mut self, message: &MessageEnvelope) -> Vec<String> {
        if message.kind.is_status() {
            self.previous = None;
            return vec![format!(
                "* {} {} ({})",
                message.display_name,
                message.body.to_lowercase(),
                clock_time(message.timestamp)
            )];
        }

        let mut lines = Vec::with_capacity(2);
        if message.starts_new_group(self.previous.as_ref()) {
            let who = if message.is_self {
                format!("{} (you)", message.display_name)
            } else {
                message.display_name.clone()
            };
            lines.push(format!("[{}] {}", clock_time(message.timestamp), who));
        }
        lines.push(format!("    {}", message.body));
        self.previous = Some(message.clone());
        lines
    }
}

/// One line per peer for `/peers`
pub fn format_peer(peer: &PeerIdentity) -> String {
    let mut roles = Vec::new();
    if peer.links.central {
        roles.push("scanned");
    }
    if peer.links.peripheral {
        roles.push("subscribed");
    }
    format!(
        "{} ({}) via {}",
        peer.display_name,
        peer.id.short(),
        roles.join(" + ")
    )
}
