//! Matchmaking Engine
//!
//! Two pairing paths over the session registry: explicit friend invites and
//! the anonymous FIFO queue drained by a periodic sweep. Both paths go
//! through the registry's atomic pair operations, so the symmetric-opponent
//! invariant cannot be observed half-formed even while the sweep timer and
//! connection handlers run concurrently.

use std::sync::Arc;
use tracing::{debug, info};

use crate::game::registry::{PairedSessions, RegistryError, SessionRegistry};
use crate::game::session::ConnectionId;

/// Outcome of a private (friend-invite) join request.
#[derive(Clone, Debug)]
pub enum PrivateJoinOutcome {
    /// Both sessions are paired; announce the match to each side.
    Matched(PairedSessions),
    /// No target was supplied: the requester relays this id to a friend
    /// out-of-band, who then joins with it.
    ShareId(ConnectionId),
}

/// Pairs unmatched sessions on demand and in periodic sweeps.
pub struct Matchmaker {
    registry: Arc<SessionRegistry>,
}

impl Matchmaker {
    /// Create a matchmaker over a shared registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Friend-invite path.
    ///
    /// With a target id, pairs requester and target in one atomic step.
    /// Without one, hands the requester their own connection id to share.
    /// The host is deliberately kept out of the anonymous queue so a sweep
    /// cannot pair them away before the invited friend arrives.
    pub async fn join_private(
        &self,
        requester: ConnectionId,
        friend: Option<ConnectionId>,
    ) -> Result<PrivateJoinOutcome, RegistryError> {
        match friend {
            Some(friend_id) => {
                let pair = self.registry.pair(requester, friend_id).await?;
                info!(
                    "{} and {} matched privately",
                    pair.first.username, pair.second.username
                );
                Ok(PrivateJoinOutcome::Matched(pair))
            }
            None => {
                let session = self.registry.get(requester).await?;
                if session.is_paired() {
                    return Err(RegistryError::AlreadyInGame);
                }
                debug!("{} hosting a private game", session.username);
                Ok(PrivateJoinOutcome::ShareId(requester))
            }
        }
    }

    /// Anonymous queue path. Idempotent: re-requesting while already queued
    /// is a no-op. Returns whether the requester was newly queued.
    pub async fn join_queue(&self, requester: ConnectionId) -> Result<bool, RegistryError> {
        let queued = self.registry.enqueue_waiting(requester).await?;
        if queued {
            debug!("connection {} queued for matchmaking", requester.short());
        }
        Ok(queued)
    }

    /// Periodic anonymous sweep: greedily pairs waiting players two at a
    /// time in FIFO order until fewer than two remain. Each pop-and-pair is
    /// a single registry step, so concurrent joins and disconnects cannot
    /// corrupt the queue. Tolerates empty and singleton queues.
    pub async fn match_waiting(&self) -> Vec<PairedSessions> {
        let mut matches = Vec::new();
        while let Some(pair) = self.registry.pair_next_waiting().await {
            info!(
                "{} and {} matched from the queue",
                pair.first.username, pair.second.username
            );
            matches.push(pair);
        }
        matches
    }
}
