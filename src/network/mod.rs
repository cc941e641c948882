//! Network Layer
//!
//! WebSocket transport for real-time play. This layer owns no game logic -
//! it routes inbound events into `game/` and turns typed outcomes into
//! outbound directives.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{resolve_username, validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{
    ClientMessage, ErrorCode, LoginRequest, LoginResult, MatchInfo, ScoreDelta, ServerError,
    ServerMessage,
};
pub use server::{GameServer, GameServerError, ServerConfig};
