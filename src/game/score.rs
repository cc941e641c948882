//! Game Session Controller
//!
//! Score tracking and end-of-game evaluation for paired sessions, plus the
//! disconnect reconciliation that turns an abrupt departure into a walkover
//! win for the remaining player.

use std::sync::Arc;
use tracing::{debug, info};

use crate::game::registry::{RegistryError, SessionRegistry};
use crate::game::session::{ConnectionId, GameOutcome, PlayerSession};

/// End-of-game rules.
///
/// Termination rule: the first player whose score reaches `winning_score`
/// wins. The check runs on the atomic snapshot taken when a score delta is
/// applied, so only the reporting player can cross the threshold within a
/// snapshot; an exact tie at or above the threshold falls to the reporter,
/// whose update settled the game.
#[derive(Clone, Copy, Debug)]
pub struct GameRules {
    /// Score a player must reach to win.
    pub winning_score: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            winning_score: crate::DEFAULT_WINNING_SCORE,
        }
    }
}

impl GameRules {
    /// Evaluate the terminal condition against a score snapshot.
    ///
    /// Pure function of the two `(connection, score)` pairs: no session
    /// state is touched. Returns `None` while the game continues.
    pub fn check_for_end_game(
        &self,
        reporter: (ConnectionId, u32),
        opponent: (ConnectionId, u32),
    ) -> Option<GameOutcome> {
        let (reporter_id, reporter_score) = reporter;
        let (opponent_id, opponent_score) = opponent;

        if reporter_score < self.winning_score && opponent_score < self.winning_score {
            return None;
        }

        if opponent_score > reporter_score {
            Some(GameOutcome {
                winner: opponent_id,
                loser: reporter_id,
            })
        } else {
            Some(GameOutcome {
                winner: reporter_id,
                loser: opponent_id,
            })
        }
    }
}

/// Result of applying one score report.
#[derive(Clone, Copy, Debug)]
pub struct ScoreReport {
    /// The reporter's total after the delta.
    pub total: u32,
    /// Opponent to mirror the raw update to, if paired.
    pub opponent: Option<ConnectionId>,
    /// Terminal result, if this update ended the game.
    pub outcome: Option<GameOutcome>,
}

/// A session removed on disconnect, with the walkover beneficiary.
#[derive(Clone, Debug)]
pub struct Disconnected {
    /// The departed player's final record.
    pub session: PlayerSession,
    /// Opponent who wins by walkover, if the player was mid-game.
    pub walkover_winner: Option<ConnectionId>,
}

/// Evaluates score updates and end-of-game conditions for paired sessions.
pub struct GameController {
    registry: Arc<SessionRegistry>,
    rules: GameRules,
}

impl GameController {
    /// Create a controller over a shared registry.
    pub fn new(registry: Arc<SessionRegistry>, rules: GameRules) -> Self {
        Self { registry, rules }
    }

    /// The rules in effect.
    pub fn rules(&self) -> GameRules {
        self.rules
    }

    /// Apply a reported score delta and evaluate the end condition.
    ///
    /// Scores are trusted as reported; no cross-validation against the
    /// opponent happens here. On a terminal result the pairing is dissolved
    /// symmetrically; if a concurrent settlement already dissolved it, the
    /// duplicate outcome is suppressed so win/lose is delivered once.
    pub async fn report_score(
        &self,
        id: ConnectionId,
        delta: u32,
    ) -> Result<ScoreReport, RegistryError> {
        let update = self.registry.update_score(id, delta).await?;

        let mut outcome = update
            .opponent
            .and_then(|opp| self.rules.check_for_end_game((id, update.total), opp));

        if let Some(result) = outcome {
            if self.registry.unpair(id).await.is_none() {
                debug!("game already settled for connection {}", id.short());
                outcome = None;
            } else {
                info!(
                    "game over: {} beats {}",
                    result.winner.short(),
                    result.loser.short()
                );
            }
        }

        Ok(ScoreReport {
            total: update.total,
            opponent: update.opponent.map(|(opp_id, _)| opp_id),
            outcome,
        })
    }

    /// Reconcile an abrupt disconnect.
    ///
    /// Removes the session; a departure mid-game always counts as a loss for
    /// the departing player, so the remaining opponent is reported as the
    /// winner. Idempotent: a second call for the same connection returns
    /// `None` and notifies nobody.
    pub async fn handle_disconnect(&self, id: ConnectionId) -> Option<Disconnected> {
        let removed = self.registry.remove(id).await?;
        if let Some(winner) = removed.opponent {
            info!(
                "{} disconnected mid-game, {} wins by walkover",
                removed.session.username,
                winner.short()
            );
        }
        Some(Disconnected {
            session: removed.session,
            walkover_winner: removed.opponent,
        })
    }
}
