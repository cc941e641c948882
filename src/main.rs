//! Type Duel Server
//!
//! Authoritative matchmaking and session server for two-player typing duels.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use type_duel::network::auth::AuthConfig;
use type_duel::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();

    info!("Type Duel Server v{}", VERSION);
    info!("Winning score: {}", config.winning_score);
    info!("Anonymous sweep every {}s", config.sweep_interval.as_secs());
    if auth.is_configured() {
        info!("Token validation enabled");
    } else {
        info!("Guest mode: accepting client display names");
    }

    let server = GameServer::new(config, auth);
    server.run().await.context("server terminated")?;

    Ok(())
}
