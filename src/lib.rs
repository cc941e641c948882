//! # Type Duel Server
//!
//! Matchmaking and session server for two-player realtime typing duels.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TYPE DUEL SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Session and matchmaking logic             │
//! │  ├── session.rs  - Connection ids and player session records │
//! │  ├── registry.rs - Owned session store, atomic pair/unpair   │
//! │  ├── matchmaker.rs - Friend-invite and anonymous queue paths │
//! │  └── score.rs    - Score updates and end-of-game rules       │
//! │                                                              │
//! │  network/        - Transport adapter                         │
//! │  ├── server.rs   - WebSocket server and event dispatch       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - External auth collaborator (JWT)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Guarantee
//!
//! Every registry mutation - pairing, unpairing, queueing, scoring,
//! removal - executes as a single critical section, so the symmetric
//! opponent relation is never observable half-updated, even while the
//! periodic matchmaking sweep races individual connection events.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::{
    ConnectionId, GameController, GameOutcome, GameRules, Matchmaker, PlayerSession,
    PrivateJoinOutcome, RegistryError, SessionRegistry,
};
pub use network::{ClientMessage, GameServer, ServerConfig, ServerMessage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds between anonymous matchmaking sweeps
pub const SWEEP_INTERVAL_SECS: u64 = 5;

/// Default score a player must reach to win a duel
pub const DEFAULT_WINNING_SCORE: u32 = 100;
