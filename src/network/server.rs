//! WebSocket Game Server
//!
//! Async WebSocket transport for the duel server. Accepts connections,
//! routes inbound events to the registry, matchmaker, and game controller,
//! and converts their typed outcomes into outbound directives. Owns no game
//! logic.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::{
    ConnectionId, GameController, GameRules, Matchmaker, PairedSessions, PrivateJoinOutcome,
    RegistryError, SessionRegistry,
};
use crate::network::auth::{resolve_username, AuthConfig};
use crate::network::protocol::{
    ClientMessage, ErrorCode, LoginResult, MatchInfo, ScoreDelta, ServerError, ServerMessage,
};

/// Denial reason for an unknown or busy invite target.
const DENY_BAD_TARGET: &str = "Wrong friend id or friend is in game";
/// Denial reason for join attempts while already paired.
const DENY_STILL_IN_GAME: &str = "You are still in a game";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Interval between anonymous matchmaking sweeps.
    pub sweep_interval: Duration,
    /// Score a player must reach to win.
    pub winning_score: u32,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            sweep_interval: Duration::from_secs(crate::SWEEP_INTERVAL_SECS),
            winning_score: crate::DEFAULT_WINNING_SCORE,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            sweep_interval: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            winning_score: std::env::var("WINNING_SCORE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.winning_score),
            version: defaults.version,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Outbound sender handles, one per live connection.
type ClientMap = Arc<RwLock<BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Authentication collaborator configuration.
    auth: AuthConfig,
    /// Shared session registry.
    registry: Arc<SessionRegistry>,
    /// Matchmaking engine.
    matchmaker: Arc<Matchmaker>,
    /// Game session controller.
    controller: Arc<GameController>,
    /// Outbound directive channels by connection.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, auth: AuthConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let matchmaker = Arc::new(Matchmaker::new(registry.clone()));
        let rules = GameRules {
            winning_score: config.winning_score,
        };
        let controller = Arc::new(GameController::new(registry.clone(), rules));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            auth,
            registry,
            matchmaker,
            controller,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Duel server listening on {}", self.config.bind_addr);

        // Spawn the periodic anonymous sweep
        let sweep_matchmaker = self.matchmaker.clone();
        let sweep_clients = self.clients.clone();
        let sweep_interval = self.config.sweep_interval;
        let sweep_handle = tokio::spawn(async move {
            Self::run_sweep_loop(sweep_matchmaker, sweep_clients, sweep_interval).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let matchmaker = self.matchmaker.clone();
        let controller = self.controller.clone();
        let clients = self.clients.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn = ConnectionId::new();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register the outbound channel
            {
                let mut clients = clients.write().await;
                clients.insert(conn, msg_tx.clone());
            }
            info!("Connection {} established from {}", conn.short(), addr);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", conn.short(), e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidInput,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    conn,
                                    client_msg,
                                    &registry,
                                    &matchmaker,
                                    &controller,
                                    &clients,
                                    &auth,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(data))) => {
                                // Binary fast path carries the flat score payload
                                if let Ok(delta) = ScoreDelta::from_bytes(&data) {
                                    Self::handle_client_message(
                                        conn,
                                        ClientMessage::Update(delta),
                                        &registry,
                                        &matchmaker,
                                        &controller,
                                        &clients,
                                        &auth,
                                        &config,
                                        &msg_tx,
                                    ).await;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Connection {} closed", conn.short());
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", conn.short(), e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();

            {
                let mut clients = clients.write().await;
                clients.remove(&conn);
            }

            // Reconcile the departure; a mid-game drop is a walkover
            if let Some(gone) = controller.handle_disconnect(conn).await {
                if let Some(winner) = gone.walkover_winner {
                    Self::send_to(&clients, winner, ServerMessage::Win).await;
                }
            }

            info!("Connection {} cleaned up", conn.short());
        });
    }

    /// Route one inbound message to the game layer and emit the directives
    /// its outcome calls for.
    #[allow(clippy::too_many_arguments)]
    async fn handle_client_message(
        conn: ConnectionId,
        msg: ClientMessage,
        registry: &Arc<SessionRegistry>,
        matchmaker: &Arc<Matchmaker>,
        controller: &Arc<GameController>,
        clients: &ClientMap,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Login(req) => {
                Self::handle_login(conn, req, registry, auth, config, sender).await;
            }
            ClientMessage::JoinPrivateGame { friend_id } => {
                Self::handle_join_private(conn, friend_id, matchmaker, clients, sender).await;
            }
            ClientMessage::JoinGame => {
                Self::handle_join_game(conn, matchmaker, sender).await;
            }
            ClientMessage::Update(delta) => {
                Self::handle_update(conn, delta, controller, clients).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64,
                    })
                    .await;
            }
        }
    }

    /// Handle login: resolve the username and register the session.
    async fn handle_login(
        conn: ConnectionId,
        req: crate::network::protocol::LoginRequest,
        registry: &Arc<SessionRegistry>,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match resolve_username(req.token.as_deref(), req.display_name.as_deref(), auth) {
            Ok(username) => {
                let session = registry.login(conn, &username).await;
                info!("Connection {} logged in as {}", conn.short(), username);
                let _ = sender
                    .send(ServerMessage::LoginResult(LoginResult {
                        success: true,
                        username: Some(session.username),
                        connection_id: Some(conn.to_string()),
                        logged_in_at: Some(session.logged_in_at),
                        error: None,
                        server_version: config.version.clone(),
                    }))
                    .await;
            }
            Err(e) => {
                warn!("Login failed for {}: {}", conn.short(), e);
                let _ = sender
                    .send(ServerMessage::LoginResult(LoginResult {
                        success: false,
                        username: None,
                        connection_id: None,
                        logged_in_at: None,
                        error: Some(e.to_string()),
                        server_version: config.version.clone(),
                    }))
                    .await;
            }
        }
    }

    /// Handle a private (friend-invite) join request.
    async fn handle_join_private(
        conn: ConnectionId,
        friend_id: Option<String>,
        matchmaker: &Arc<Matchmaker>,
        clients: &ClientMap,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let friend = match friend_id {
            Some(raw) => match raw.parse::<ConnectionId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    let _ = sender
                        .send(ServerMessage::JoinPrivateGameDenied {
                            message: DENY_BAD_TARGET.to_string(),
                        })
                        .await;
                    return;
                }
            },
            None => None,
        };

        match matchmaker.join_private(conn, friend).await {
            Ok(PrivateJoinOutcome::Matched(pair)) => {
                Self::announce_match(clients, &pair).await;
            }
            Ok(PrivateJoinOutcome::ShareId(id)) => {
                let _ = sender
                    .send(ServerMessage::WaitForFriend { id: id.to_string() })
                    .await;
            }
            Err(RegistryError::AlreadyInGame) => {
                let _ = sender
                    .send(ServerMessage::JoinPrivateGameDenied {
                        message: DENY_STILL_IN_GAME.to_string(),
                    })
                    .await;
            }
            Err(RegistryError::InvalidOrBusyTarget) => {
                let _ = sender
                    .send(ServerMessage::JoinPrivateGameDenied {
                        message: DENY_BAD_TARGET.to_string(),
                    })
                    .await;
            }
            Err(RegistryError::NotFound) => {
                // Join before login, or raced a disconnect
                debug!("Private join from unregistered connection {}", conn.short());
            }
        }
    }

    /// Handle an anonymous queue join.
    async fn handle_join_game(
        conn: ConnectionId,
        matchmaker: &Arc<Matchmaker>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match matchmaker.join_queue(conn).await {
            Ok(_) => {}
            Err(RegistryError::AlreadyInGame) => {
                let _ = sender
                    .send(ServerMessage::Error(ServerError {
                        code: ErrorCode::AlreadyInGame,
                        message: DENY_STILL_IN_GAME.to_string(),
                    }))
                    .await;
            }
            Err(_) => {
                debug!("Queue join from unregistered connection {}", conn.short());
            }
        }
    }

    /// Handle a score report: mirror it to the opponent and deliver the
    /// end-of-game directives when the update settles the game.
    async fn handle_update(
        conn: ConnectionId,
        delta: ScoreDelta,
        controller: &Arc<GameController>,
        clients: &ClientMap,
    ) {
        let report = match controller.report_score(conn, delta.delta).await {
            Ok(report) => report,
            Err(_) => {
                debug!("Score report from unregistered connection {}", conn.short());
                return;
            }
        };

        if let Some(opponent) = report.opponent {
            Self::send_to(clients, opponent, ServerMessage::Update(delta)).await;
        }

        if let Some(outcome) = report.outcome {
            Self::send_to(clients, outcome.winner, ServerMessage::Win).await;
            Self::send_to(clients, outcome.loser, ServerMessage::Lose).await;
        }
    }

    /// Announce a formed pair to both sides, each with the other's name.
    async fn announce_match(clients: &ClientMap, pair: &PairedSessions) {
        Self::send_to(
            clients,
            pair.first.id,
            ServerMessage::Match(MatchInfo {
                opponent_name: pair.second.username.clone(),
            }),
        )
        .await;
        Self::send_to(
            clients,
            pair.second.id,
            ServerMessage::Match(MatchInfo {
                opponent_name: pair.first.username.clone(),
            }),
        )
        .await;
    }

    /// Deliver a directive to one connection, if it is still present.
    async fn send_to(clients: &ClientMap, id: ConnectionId, msg: ServerMessage) {
        let sender = {
            let clients = clients.read().await;
            clients.get(&id).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(msg).await;
        }
    }

    /// Run the periodic anonymous matchmaking sweep.
    async fn run_sweep_loop(
        matchmaker: Arc<Matchmaker>,
        clients: ClientMap,
        sweep_interval: Duration,
    ) {
        let mut ticker = interval(sweep_interval);

        loop {
            ticker.tick().await;

            // Empty or singleton queues make this a no-op
            let matches = matchmaker.match_waiting().await;
            for pair in &matches {
                Self::announce_match(&clients, pair).await;
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get registered session count.
    pub async fn session_count(&self) -> usize {
        self.registry.session_count().await
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.registry.waiting_count().await
    }
}
