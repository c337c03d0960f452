//! Chat message model

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use super::constants::{HEARTBEAT_CONTENT, SYSTEM_SENDER};

/// Kind of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Login request (client) or login acknowledgement carrying the id (server)
    Join,
    /// Explicit disconnect
    Leave,
    /// Chat text, broadcast to every other member
    Normal,
    /// Server announcement
    System,
    /// Leaderboard request (client) or report (server)
    Rank,
    /// Liveness probe, no reply
    Heartbeat,
    /// A tag this build does not understand
    Unknown(u8),
}

impl MessageKind {
    /// Wire tag for this kind
    pub fn to_u8(self) -> u8 {
        match self {
            MessageKind::Join => 1,
            MessageKind::Leave => 2,
            MessageKind::Normal => 3,
            MessageKind::System => 4,
            MessageKind::Rank => 5,
            MessageKind::Heartbeat => 6,
            MessageKind::Unknown(tag) => tag,
        }
    }

    /// Kind for a wire tag; unrecognized tags are preserved
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => MessageKind::Join,
            2 => MessageKind::Leave,
            3 => MessageKind::Normal,
            4 => MessageKind::System,
            5 => MessageKind::Rank,
            6 => MessageKind::Heartbeat,
            other => MessageKind::Unknown(other),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Join => write!(f, "join"),
            MessageKind::Leave => write!(f, "leave"),
            MessageKind::Normal => write!(f, "normal"),
            MessageKind::System => write!(f, "system"),
            MessageKind::Rank => write!(f, "rank"),
            MessageKind::Heartbeat => write!(f, "heartbeat"),
            MessageKind::Unknown(tag) => write!(f, "unknown({})", tag),
        }
    }
}

/// A message exchanged on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// Sender display name (empty for some server messages)
    pub from: String,
    /// Sender session id, empty until assigned
    pub id: String,
    pub content: String,
    /// Seconds since the Unix epoch, stamped by the sender
    pub timestamp: i64,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(kind: MessageKind, from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            id: String::new(),
            content: content.into(),
            timestamp: unix_now(),
        }
    }

    /// Set the sender id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Login request carrying the chosen display name
    pub fn login(name: impl Into<String>) -> Self {
        Self::new(MessageKind::Join, name, "")
    }

    /// Login acknowledgement carrying the assigned id
    pub fn welcome(name: &str, id: &str) -> Self {
        Self::new(MessageKind::Join, name, format!("Welcome {}!", name)).with_id(id)
    }

    /// Chat text
    pub fn normal(name: impl Into<String>, id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageKind::Normal, name, text).with_id(id)
    }

    /// Server announcement
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, SYSTEM_SENDER, content)
    }

    /// Leaderboard report sent back to one caller
    pub fn rank_report(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Rank, "", content)
    }

    /// Leaderboard request
    pub fn rank_request(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(MessageKind::Rank, name, "").with_id(id)
    }

    /// Liveness probe
    pub fn heartbeat(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(MessageKind::Heartbeat, name, HEARTBEAT_CONTENT).with_id(id)
    }

    /// Explicit disconnect
    pub fn leave(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(MessageKind::Leave, name, "").with_id(id)
    }
}

/// Current time in whole seconds since the Unix epoch
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in [
            MessageKind::Join,
            MessageKind::Leave,
            MessageKind::Normal,
            MessageKind::System,
            MessageKind::Rank,
            MessageKind::Heartbeat,
        ] {
            assert_eq!(MessageKind::from_u8(kind.to_u8()), kind);
        }
        assert_eq!(MessageKind::from_u8(0), MessageKind::Unknown(0));
        assert_eq!(MessageKind::from_u8(42).to_u8(), 42);
    }

    #[test]
    fn test_constructors() {
        let msg = Message::welcome("alice", "a1b2");
        assert_eq!(msg.kind, MessageKind::Join);
        assert_eq!(msg.id, "a1b2");
        assert_eq!(msg.content, "Welcome alice!");
        assert!(msg.timestamp > 0);

        let msg = Message::system("hi");
        assert_eq!(msg.from, SYSTEM_SENDER);
        assert!(msg.id.is_empty());

        let msg = Message::login("bob");
        assert_eq!(msg.from, "bob");
        assert!(msg.id.is_empty());
    }
}
