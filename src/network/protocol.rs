//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease, with a binary
//! (bincode) fast path for the flat score payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sign in and register a player session.
    Login(LoginRequest),

    /// Join a private game, either by a friend's shared id or as the host.
    JoinPrivateGame {
        /// Connection id shared by the inviting friend, if joining one.
        friend_id: Option<String>,
    },

    /// Join the anonymous matchmaking queue.
    JoinGame,

    /// Report score progress for the current game.
    Update(ScoreDelta),

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back in the pong.
        timestamp: u64,
    },
}

/// Login request.
///
/// Carries a bearer token when the server validates against an external
/// auth provider, or a plain display name in guest mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Bearer token issued by the external auth provider.
    pub token: Option<String>,
    /// Display name, used only when no token validation is configured.
    pub display_name: Option<String>,
    /// Client version for compatibility check.
    pub client_version: String,
}

/// One reported score increment.
///
/// Flat struct so it also works over the binary path. The server applies
/// the delta and mirrors the payload unchanged to the opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDelta {
    /// Points gained since the last report.
    pub delta: u32,
    /// Client timestamp of the report.
    pub timestamp: u64,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Login acknowledgement.
    LoginResult(LoginResult),

    /// A game was formed; start playing.
    Match(MatchInfo),

    /// Hosting a private game: relay this id to a friend out-of-band.
    WaitForFriend {
        /// The requester's own connection id.
        id: String,
    },

    /// A private join request was denied.
    JoinPrivateGameDenied {
        /// Human-readable reason.
        message: String,
    },

    /// The opponent's raw score report, mirrored as received.
    Update(ScoreDelta),

    /// The game ended in this player's favor.
    Win,

    /// The game ended against this player.
    Lose,

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall-clock milliseconds.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is stopping.
        reason: String,
    },
}

/// Login acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    /// Whether login succeeded.
    pub success: bool,
    /// Resolved display name.
    pub username: Option<String>,
    /// This connection's id, usable as a friend-invite handle.
    pub connection_id: Option<String>,
    /// When the session was first registered.
    pub logged_in_at: Option<DateTime<Utc>>,
    /// Error message if login failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Match announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    /// The matched opponent's display name.
    pub opponent_name: String,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// Already paired into a game.
    AlreadyInGame,
    /// Invalid input.
    InvalidInput,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ScoreDelta {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
