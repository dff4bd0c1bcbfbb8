//! Signaling relay — HTTP + WebSocket server.
//!
//! Optional env: HOST, PORT, WS_PATH, MAX_PAYLOAD_BYTES, OUTBOUND_BUFFER,
//! ALLOWED_ORIGINS, ALLOWED_ORIGIN_SUFFIXES, SERVICE_NAME, SHUTDOWN_GRACE_SECS

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use signal_relay::{api, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env().context("config")?;
    let addr = config.bind_addr();
    let ws_path = config.ws_path.clone();
    let state = api::AppState::new(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    let local = listener.local_addr()?;
    tracing::info!("Relay listening on {}", local);
    tracing::info!("Health check: http://{}/health", local);
    tracing::info!("WebSocket endpoint: ws://{}{}", local, ws_path);

    api::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Server closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received, shutting down gracefully"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down gracefully"),
    }
}
