// AEGIS client - headless notification watcher
// Entry point and client setup

use aegis_client::app;
use aegis_client::services::SessionCredentials;
use anyhow::Context;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis_client=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AEGIS client");

    let data_dir = std::env::var_os("AEGIS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".aegis"));

    let state = app::setup(data_dir)
        .await
        .context("Failed to initialize client")?;

    match (std::env::var("AEGIS_TOKEN"), std::env::var("AEGIS_TENANT_ID")) {
        (Ok(token), Ok(tenant_id)) => {
            let mut credentials = SessionCredentials::new(token, tenant_id);
            if let Ok(user_id) = std::env::var("AEGIS_USER_ID") {
                credentials = credentials.with_user(user_id);
            }
            state
                .session
                .login(credentials)
                .await
                .context("Failed to store session credentials")?;
        }
        _ => tracing::warn!("AEGIS_TOKEN or AEGIS_TENANT_ID not set, push connection disabled"),
    }

    tracing::info!("Unread notifications: {}", state.unread.get().await);
    let _subscription = state
        .unread
        .subscribe(|count| tracing::info!("Unread notifications: {}", count));

    let provider = state
        .mount_notifications()
        .context("Failed to start notifications")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    provider.unmount();
    tracing::info!("Shutting down");

    Ok(())
}
