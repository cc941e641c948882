//! Game Logic Module
//!
//! Session lifecycle, matchmaking, and scoring. Transport-free: nothing in
//! here knows about WebSockets or wire messages.
//!
//! ## Module Structure
//!
//! - `session`: connection ids and the per-player session record
//! - `registry`: the owned session store with atomic pair/unpair operations
//! - `matchmaker`: friend-invite and anonymous-queue pairing paths
//! - `score`: score updates, end-of-game rules, disconnect reconciliation

pub mod matchmaker;
pub mod registry;
pub mod score;
pub mod session;

// Re-export key types
pub use matchmaker::{Matchmaker, PrivateJoinOutcome};
pub use registry::{PairedSessions, RegistryError, RemovedSession, ScoreUpdate, SessionRegistry};
pub use score::{Disconnected, GameController, GameRules, ScoreReport};
pub use session::{ConnectionId, GameOutcome, PlayerSession, BASELINE_SCORE};
