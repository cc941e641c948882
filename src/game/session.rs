//! Player Session Types
//!
//! One `PlayerSession` per connected, authenticated player.
//! Sessions live in the registry from login until the connection closes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Unique identifier of one live connection.
///
/// Minted when the WebSocket is accepted, before login. Doubles as the
/// shareable friend-invite handle, so it prints and parses as a UUID.
/// Implements Ord for BTreeMap keying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a raw UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// =============================================================================
// PLAYER SESSION
// =============================================================================

/// Starting score for every session and for every fresh pairing.
pub const BASELINE_SCORE: u32 = 0;

/// Server-side record of one connected, authenticated player.
///
/// Invariants maintained by the registry:
/// - `opponent` is symmetric: if A points at B, B points at A.
/// - `waiting` and a non-`None` opponent are mutually exclusive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerSession {
    /// Connection identifier; primary key in the registry.
    pub id: ConnectionId,
    /// Display name resolved at login.
    pub username: String,
    /// Back-reference to the paired opponent, if any.
    pub opponent: Option<ConnectionId>,
    /// Current score, counted from [`BASELINE_SCORE`].
    pub score: u32,
    /// Whether the player sits in the anonymous matchmaking queue.
    pub waiting: bool,
    /// When the player first logged in on this connection.
    pub logged_in_at: DateTime<Utc>,
}

impl PlayerSession {
    /// Create a fresh, unmatched session.
    pub fn new(id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            opponent: None,
            score: BASELINE_SCORE,
            waiting: false,
            logged_in_at: Utc::now(),
        }
    }

    /// Whether the session is currently paired into a game.
    pub fn is_paired(&self) -> bool {
        self.opponent.is_some()
    }
}

/// Winner and loser of a finished game, by connection id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameOutcome {
    /// The winning connection.
    pub winner: ConnectionId,
    /// The losing connection.
    pub loser: ConnectionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_roundtrip() {
        let id = ConnectionId::new();
        let parsed: ConnectionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_connection_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn test_short_is_prefix() {
        let id = ConnectionId::new();
        assert!(id.to_string().starts_with(&id.short()));
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = PlayerSession::new(ConnectionId::new(), "alice");
        assert_eq!(session.username, "alice");
        assert_eq!(session.score, BASELINE_SCORE);
        assert!(!session.waiting);
        assert!(!session.is_paired());
    }
}
