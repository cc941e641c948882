//! Session Registry
//!
//! In-memory store of every connected player, the sole owner of the player
//! lifecycle. One `RwLock` guards the session map together with the anonymous
//! FIFO waiting queue, so pairing, unpairing, queueing, scoring, and removal
//! each execute as a single indivisible step. Opponent symmetry is never
//! observable half-updated.

use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::game::session::{ConnectionId, PlayerSession, BASELINE_SCORE};

/// Registry errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The referenced connection never logged in or was already removed.
    #[error("session not found")]
    NotFound,

    /// The requester is already paired into a game.
    #[error("already in a game")]
    AlreadyInGame,

    /// The target session is unknown, busy, or the requester itself.
    #[error("unknown or busy opponent")]
    InvalidOrBusyTarget,
}

/// Result of removing a session from the registry.
#[derive(Clone, Debug)]
pub struct RemovedSession {
    /// The record as it stood at removal.
    pub session: PlayerSession,
    /// The former opponent, already unpaired, if the session was in a game.
    pub opponent: Option<ConnectionId>,
}

/// Both sides of a freshly formed pairing, cloned after linking.
#[derive(Clone, Debug)]
pub struct PairedSessions {
    /// The requester (friend path) or the longer-waiting player (sweep).
    pub first: PlayerSession,
    /// The target (friend path) or the other popped player (sweep).
    pub second: PlayerSession,
}

/// Atomic snapshot produced by a score update.
#[derive(Clone, Copy, Debug)]
pub struct ScoreUpdate {
    /// The reporter's total after applying the delta.
    pub total: u32,
    /// Opponent id and score, captured in the same critical section.
    pub opponent: Option<(ConnectionId, u32)>,
}

/// Inner state: the session map plus the anonymous FIFO queue.
///
/// All mutations happen through `&mut self` methods while the registry's
/// write guard is held, which is what makes the compound operations atomic.
#[derive(Debug, Default)]
struct RegistryState {
    sessions: BTreeMap<ConnectionId, PlayerSession>,
    waiting: VecDeque<ConnectionId>,
}

impl RegistryState {
    /// Register a session, or overwrite the username of an existing one.
    /// Re-login never touches pairing or queue state.
    fn upsert(&mut self, id: ConnectionId, username: &str) -> PlayerSession {
        let session = self
            .sessions
            .entry(id)
            .and_modify(|s| s.username = username.to_string())
            .or_insert_with(|| PlayerSession::new(id, username));
        session.clone()
    }

    fn get(&self, id: ConnectionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    /// Delete a session, purging it from the queue and freeing its opponent.
    fn remove(&mut self, id: ConnectionId) -> Option<RemovedSession> {
        let session = self.sessions.remove(&id)?;
        self.waiting.retain(|w| *w != id);

        let mut opponent = None;
        if let Some(opp_id) = session.opponent {
            if let Some(opp) = self.sessions.get_mut(&opp_id) {
                opp.opponent = None;
                opp.score = BASELINE_SCORE;
                opponent = Some(opp_id);
            }
        }

        Some(RemovedSession { session, opponent })
    }

    /// Link two sessions into a game. Both sides leave the waiting queue and
    /// start from the baseline score.
    fn pair(&mut self, a: ConnectionId, b: ConnectionId) -> Result<PairedSessions, RegistryError> {
        let requester = self.sessions.get(&a).ok_or(RegistryError::NotFound)?;
        if requester.is_paired() {
            return Err(RegistryError::AlreadyInGame);
        }
        if a == b {
            return Err(RegistryError::InvalidOrBusyTarget);
        }
        match self.sessions.get(&b) {
            Some(target) if !target.is_paired() => {}
            _ => return Err(RegistryError::InvalidOrBusyTarget),
        }

        self.waiting.retain(|w| *w != a && *w != b);
        self.link(a, b);

        Ok(PairedSessions {
            first: self.sessions[&a].clone(),
            second: self.sessions[&b].clone(),
        })
    }

    /// Dissolve a pairing from either side. Returns the former opponent.
    fn unpair(&mut self, a: ConnectionId) -> Option<ConnectionId> {
        let session = self.sessions.get_mut(&a)?;
        let opp_id = session.opponent.take()?;
        session.score = BASELINE_SCORE;
        if let Some(opp) = self.sessions.get_mut(&opp_id) {
            opp.opponent = None;
            opp.score = BASELINE_SCORE;
        }
        Some(opp_id)
    }

    /// Add a session to the anonymous queue. Idempotent: returns `false`
    /// when the session was already waiting.
    fn enqueue(&mut self, id: ConnectionId) -> Result<bool, RegistryError> {
        let session = self.sessions.get_mut(&id).ok_or(RegistryError::NotFound)?;
        if session.is_paired() {
            return Err(RegistryError::AlreadyInGame);
        }
        if session.waiting {
            return Ok(false);
        }
        session.waiting = true;
        self.waiting.push_back(id);
        Ok(true)
    }

    /// Pop the two oldest waiting entries and pair them, all in one step.
    /// The odd one out keeps its place at the head of the queue.
    fn pair_next_waiting(&mut self) -> Option<PairedSessions> {
        let a = self.pop_waiting()?;
        let Some(b) = self.pop_waiting() else {
            self.waiting.push_front(a);
            return None;
        };

        self.link(a, b);

        Some(PairedSessions {
            first: self.sessions[&a].clone(),
            second: self.sessions[&b].clone(),
        })
    }

    /// Apply a score delta and snapshot both sides of the pairing.
    fn update_score(
        &mut self,
        id: ConnectionId,
        delta: u32,
    ) -> Result<ScoreUpdate, RegistryError> {
        let session = self.sessions.get_mut(&id).ok_or(RegistryError::NotFound)?;
        session.score = session.score.saturating_add(delta);
        let total = session.score;
        let opp_id = session.opponent;

        let opponent = opp_id.and_then(|o| self.sessions.get(&o).map(|s| (o, s.score)));
        Ok(ScoreUpdate { total, opponent })
    }

    /// Set both back-references, clear both waiting flags, and reset both
    /// scores to the baseline.
    fn link(&mut self, a: ConnectionId, b: ConnectionId) {
        if let Some(s) = self.sessions.get_mut(&a) {
            s.opponent = Some(b);
            s.waiting = false;
            s.score = BASELINE_SCORE;
        }
        if let Some(s) = self.sessions.get_mut(&b) {
            s.opponent = Some(a);
            s.waiting = false;
            s.score = BASELINE_SCORE;
        }
    }

    /// Pop the oldest queue entry that still refers to a waiting session.
    fn pop_waiting(&mut self) -> Option<ConnectionId> {
        while let Some(id) = self.waiting.pop_front() {
            let still_waiting = self
                .sessions
                .get(&id)
                .map_or(false, |s| s.waiting && !s.is_paired());
            if still_waiting {
                return Some(id);
            }
        }
        None
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// Concurrency-safe session store shared by the matchmaking engine, the game
/// session controller, and the transport adapter.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a session on login, or refresh the username on re-login.
    pub async fn login(&self, id: ConnectionId, username: &str) -> PlayerSession {
        self.state.write().await.upsert(id, username)
    }

    /// Snapshot a session by connection id.
    pub async fn get(&self, id: ConnectionId) -> Result<PlayerSession, RegistryError> {
        self.state
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    /// Remove a session, freeing its opponent for rematching. Idempotent:
    /// a second removal of the same id returns `None`.
    pub async fn remove(&self, id: ConnectionId) -> Option<RemovedSession> {
        self.state.write().await.remove(id)
    }

    /// Atomically pair two sessions.
    pub async fn pair(
        &self,
        a: ConnectionId,
        b: ConnectionId,
    ) -> Result<PairedSessions, RegistryError> {
        self.state.write().await.pair(a, b)
    }

    /// Atomically dissolve a pairing from either side.
    pub async fn unpair(&self, a: ConnectionId) -> Option<ConnectionId> {
        self.state.write().await.unpair(a)
    }

    /// Join the anonymous waiting queue.
    pub async fn enqueue_waiting(&self, id: ConnectionId) -> Result<bool, RegistryError> {
        self.state.write().await.enqueue(id)
    }

    /// Pair the two longest-waiting players, if at least two are queued.
    pub async fn pair_next_waiting(&self) -> Option<PairedSessions> {
        self.state.write().await.pair_next_waiting()
    }

    /// Apply a score delta, returning the atomic pairing snapshot.
    pub async fn update_score(
        &self,
        id: ConnectionId,
        delta: u32,
    ) -> Result<ScoreUpdate, RegistryError> {
        self.state.write().await.update_score(id, delta)
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Number of players in the anonymous queue.
    pub async fn waiting_count(&self) -> usize {
        self.state.read().await.waiting.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn conn(n: u8) -> ConnectionId {
        ConnectionId::from_uuid(Uuid::from_u128(n as u128 + 1))
    }

    /// Assert opponent symmetry, waiting exclusivity, and queue accuracy.
    fn check_invariants(state: &RegistryState) {
        for (id, s) in &state.sessions {
            assert_eq!(*id, s.id);
            if let Some(opp_id) = s.opponent {
                let opp = state
                    .sessions
                    .get(&opp_id)
                    .expect("opponent back-reference dangles");
                assert_eq!(opp.opponent, Some(*id), "opponent link is asymmetric");
                assert!(!s.waiting, "paired session still flagged waiting");
            }
            if s.waiting {
                assert!(
                    state.waiting.contains(id),
                    "waiting flag set without a queue entry"
                );
            }
        }
        for id in &state.waiting {
            let s = state.sessions.get(id).expect("queue entry without session");
            assert!(s.waiting && s.opponent.is_none());
        }
    }

    #[tokio::test]
    async fn test_login_is_idempotent_per_connection() {
        let registry = SessionRegistry::new();
        let a = conn(1);

        let first = registry.login(a, "alice").await;
        registry.enqueue_waiting(a).await.unwrap();
        let second = registry.login(a, "alicia").await;

        assert_eq!(second.username, "alicia");
        assert!(second.waiting, "re-login must not reset queue state");
        assert_eq!(first.logged_in_at, second.logged_in_at);
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.get(conn(9)).await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_pair_links_both_sides() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;

        let pair = registry.pair(a, b).await.unwrap();
        assert_eq!(pair.first.username, "alice");
        assert_eq!(pair.second.username, "bob");
        assert_eq!(pair.first.opponent, Some(b));
        assert_eq!(pair.second.opponent, Some(a));
        assert!(!pair.first.waiting && !pair.second.waiting);
    }

    #[tokio::test]
    async fn test_pair_clears_waiting_membership() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.enqueue_waiting(a).await.unwrap();

        registry.pair(a, b).await.unwrap();
        assert_eq!(registry.waiting_count().await, 0);
        assert!(!registry.get(a).await.unwrap().waiting);
    }

    #[tokio::test]
    async fn test_pair_rejects_busy_target() {
        let registry = SessionRegistry::new();
        let (a, b, c) = (conn(1), conn(2), conn(3));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.login(c, "carol").await;
        registry.pair(a, b).await.unwrap();

        let err = registry.pair(c, b).await.unwrap_err();
        assert_eq!(err, RegistryError::InvalidOrBusyTarget);

        // Neither side's state changed.
        assert!(!registry.get(c).await.unwrap().is_paired());
        assert_eq!(registry.get(b).await.unwrap().opponent, Some(a));
    }

    #[tokio::test]
    async fn test_pair_rejects_paired_requester() {
        let registry = SessionRegistry::new();
        let (a, b, c) = (conn(1), conn(2), conn(3));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.login(c, "carol").await;
        registry.pair(a, b).await.unwrap();

        assert_eq!(registry.pair(a, c).await.unwrap_err(), RegistryError::AlreadyInGame);
    }

    #[tokio::test]
    async fn test_pair_rejects_unknown_and_self() {
        let registry = SessionRegistry::new();
        let a = conn(1);
        registry.login(a, "alice").await;

        assert_eq!(
            registry.pair(conn(9), a).await.unwrap_err(),
            RegistryError::NotFound
        );
        assert_eq!(
            registry.pair(a, conn(9)).await.unwrap_err(),
            RegistryError::InvalidOrBusyTarget
        );
        assert_eq!(
            registry.pair(a, a).await.unwrap_err(),
            RegistryError::InvalidOrBusyTarget
        );
    }

    #[tokio::test]
    async fn test_remove_frees_opponent() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.pair(a, b).await.unwrap();
        registry.update_score(b, 40).await.unwrap();

        let removed = registry.remove(a).await.unwrap();
        assert_eq!(removed.opponent, Some(b));

        let bob = registry.get(b).await.unwrap();
        assert!(bob.opponent.is_none(), "opponent back-reference must be cleared");
        assert_eq!(bob.score, BASELINE_SCORE);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.pair(a, b).await.unwrap();

        assert!(registry.remove(a).await.is_some());
        assert!(registry.remove(a).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_purges_waiting_queue() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.enqueue_waiting(a).await.unwrap();
        registry.enqueue_waiting(b).await.unwrap();

        registry.remove(a).await.unwrap();
        assert_eq!(registry.waiting_count().await, 1);
        assert!(registry.pair_next_waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let registry = SessionRegistry::new();
        let a = conn(1);
        registry.login(a, "alice").await;

        assert!(registry.enqueue_waiting(a).await.unwrap());
        assert!(!registry.enqueue_waiting(a).await.unwrap());
        assert_eq!(registry.waiting_count().await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejected_while_paired() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.pair(a, b).await.unwrap();

        assert_eq!(
            registry.enqueue_waiting(a).await.unwrap_err(),
            RegistryError::AlreadyInGame
        );
    }

    #[tokio::test]
    async fn test_fifo_pairing_order() {
        let registry = SessionRegistry::new();
        for (n, name) in [(1, "p1"), (2, "p2"), (3, "p3")] {
            registry.login(conn(n), name).await;
            registry.enqueue_waiting(conn(n)).await.unwrap();
        }

        let pair = registry.pair_next_waiting().await.unwrap();
        assert_eq!(pair.first.id, conn(1));
        assert_eq!(pair.second.id, conn(2));

        // P3 is the odd one out and stays queued.
        assert!(registry.pair_next_waiting().await.is_none());
        assert!(registry.get(conn(3)).await.unwrap().waiting);
    }

    #[tokio::test]
    async fn test_unpair_resets_both_sides() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.pair(a, b).await.unwrap();
        registry.update_score(a, 100).await.unwrap();

        assert_eq!(registry.unpair(a).await, Some(b));
        assert_eq!(registry.unpair(a).await, None);

        let alice = registry.get(a).await.unwrap();
        let bob = registry.get(b).await.unwrap();
        assert!(alice.opponent.is_none() && bob.opponent.is_none());
        assert_eq!(alice.score, BASELINE_SCORE);
    }

    #[tokio::test]
    async fn test_update_score_snapshots_opponent() {
        let registry = SessionRegistry::new();
        let (a, b) = (conn(1), conn(2));
        registry.login(a, "alice").await;
        registry.login(b, "bob").await;
        registry.pair(a, b).await.unwrap();
        registry.update_score(b, 30).await.unwrap();

        let update = registry.update_score(a, 12).await.unwrap();
        assert_eq!(update.total, 12);
        assert_eq!(update.opponent, Some((b, 30)));
    }

    #[tokio::test]
    async fn test_update_score_without_opponent() {
        let registry = SessionRegistry::new();
        let a = conn(1);
        registry.login(a, "alice").await;

        let update = registry.update_score(a, 7).await.unwrap();
        assert_eq!(update.total, 7);
        assert!(update.opponent.is_none());

        assert_eq!(
            registry.update_score(conn(9), 1).await.unwrap_err(),
            RegistryError::NotFound
        );
    }

    /// One step of the randomized operation model.
    #[derive(Clone, Debug)]
    enum Op {
        Login(u8),
        Pair(u8, u8),
        Unpair(u8),
        Enqueue(u8),
        Sweep,
        Remove(u8),
        Score(u8, u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let id = 0u8..6;
        prop_oneof![
            id.clone().prop_map(Op::Login),
            (id.clone(), id.clone()).prop_map(|(a, b)| Op::Pair(a, b)),
            id.clone().prop_map(Op::Unpair),
            id.clone().prop_map(Op::Enqueue),
            Just(Op::Sweep),
            id.clone().prop_map(Op::Remove),
            (id, 0u8..50).prop_map(|(a, d)| Op::Score(a, d)),
        ]
    }

    proptest! {
        /// Opponent symmetry and waiting exclusivity survive any
        /// interleaving of registry operations.
        #[test]
        fn prop_invariants_hold(ops in proptest::collection::vec(op_strategy(), 1..80)) {
            let mut state = RegistryState::default();
            for op in ops {
                match op {
                    Op::Login(a) => {
                        state.upsert(conn(a), "player");
                    }
                    Op::Pair(a, b) => {
                        let _ = state.pair(conn(a), conn(b));
                    }
                    Op::Unpair(a) => {
                        state.unpair(conn(a));
                    }
                    Op::Enqueue(a) => {
                        let _ = state.enqueue(conn(a));
                    }
                    Op::Sweep => {
                        while state.pair_next_waiting().is_some() {}
                    }
                    Op::Remove(a) => {
                        state.remove(conn(a));
                    }
                    Op::Score(a, d) => {
                        let _ = state.update_score(conn(a), d as u32);
                    }
                }
                check_invariants(&state);
            }
        }
    }
}
