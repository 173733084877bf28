//! Factory GitHub App
//!
//! Listens for GitHub webhooks and updates Factory tracking issues.
//! Sending SIGHUP drops all cached installation tokens.

use anyhow::{Context, Result};
use clap::Parser;
use factory_app::{build_router, AppState, Config};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = Config::parse();
    config.log_warnings();

    let state = AppState::from_config(&config).context("Invalid configuration")?;

    if !state.authenticator.mode().is_enforced() {
        tracing::warn!("Webhook signature verification is DISABLED (PermissiveNoSecret)");
    }

    #[cfg(unix)]
    spawn_cache_reset(state.tracker.client().clone())?;

    let app = build_router(state, config.limits());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Factory GitHub App listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Clear the token cache on every SIGHUP
#[cfg(unix)]
fn spawn_cache_reset(client: factory_github_app::CredentialClient) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, forcing re-authentication");
            client.clear_cache().await;
        }
    });
    Ok(())
}
