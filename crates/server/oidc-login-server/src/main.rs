use anyhow::{Context, Result};
use oidc_login_server::{AppState, Config, app, logging, spawn_session_cleanup};
use oidc_pkce_client::InMemorySessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;
    logging::init(&config)?;

    let store = Arc::new(InMemorySessionStore::new());
    let state = AppState::new(&config, store)?;

    spawn_session_cleanup(
        state.flow.clone(),
        Duration::from_secs(config.session.cleanup_interval_seconds),
    );

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Login server listening on http://{}", addr);
    info!(
        redirect_uri = %config.keycloak.redirect_uri,
        realm = %config.keycloak.realm,
        secure_cookies = config.secure_cookies(),
        "OIDC client configured"
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
