//! Canvas relay — room-scoped WebSocket broadcast for the canvas sync core.

mod config;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

use crate::config::RelayConfig;

#[derive(Debug, thiserror::Error)]
enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal outside development.
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::from_env();
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind { addr: addr.clone(), source })?;

    let app = routes::app(state::AppState::new(config));
    tracing::info!(%addr, "canvas relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
