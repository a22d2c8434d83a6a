use anyhow::{Context, Result};
use rtmon_common::shutdown::Shutdown;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use rtmon_server::app;
use rtmon_server::config::ServerConfig;
use rtmon_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rtmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;
    let address = config.address.clone();

    tracing::info!(
        address = %address,
        database = config.database_dsn.is_some(),
        file = %config.file_storage_path,
        signed = config.key.is_some(),
        encrypted = config.crypto_key.is_some(),
        trusted_subnet = ?config.trusted_subnet,
        "rtmon-server starting"
    );

    let shutdown = Shutdown::new();
    let (state, flusher) = AppState::from_config(config, shutdown.subscribe()).await?;
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(address = %address, "HTTP server listening");

    app::serve(
        listener,
        app,
        async {
            shutdown_signal().await;
            tracing::info!("Shutting down gracefully, draining requests");
        },
        &shutdown,
        flusher,
    )
    .await
    .context("HTTP server error")?;

    tracing::info!("rtmon-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
