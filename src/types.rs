//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based identifier for one accepted connection
//! - `RoomName`: trimmed, non-empty chat room name

use uuid::Uuid;

/// Sender label used for server-generated messages
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Room every `PART` falls back to
pub const LOBBY: &str = "lobby";

/// Unique connection identifier (newtype pattern)
///
/// Accounts outlive connections, so this only tags log lines for one
/// accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name
///
/// Names are case-sensitive and never contain surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomName(String);

impl RoomName {
    /// Parse a room name from user input, `None` if it is blank
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw.trim();
        if name.is_empty() {
            None
        } else {
            Some(Self(name.to_string()))
        }
    }

    /// The fallback room
    pub fn lobby() -> Self {
        Self(LOBBY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_name_trimmed() {
        let name = RoomName::parse("  general ").unwrap();
        assert_eq!(name.as_str(), "general");
        assert_eq!(name.to_string(), "general");
    }

    #[test]
    fn test_room_name_blank_rejected() {
        assert!(RoomName::parse("").is_none());
        assert!(RoomName::parse("   ").is_none());
    }

    #[test]
    fn test_lobby() {
        assert_eq!(RoomName::lobby().as_str(), LOBBY);
    }
}
