//! Signaling relay probe.

use std::env;
use std::time::Duration;

use clap::Parser;
use signal_probe::{cli, relay_client};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Commands::Health { url } => {
            let base_url = url.unwrap_or_else(relay_url);
            let health = relay_client::health(&base_url).await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        cli::Commands::Listen { url } => {
            let ws_url = url.unwrap_or_else(relay_ws_url);
            relay_client::listen(&ws_url).await?;
        }
        cli::Commands::Send {
            message,
            url,
            wait_secs,
        } => {
            let ws_url = url.unwrap_or_else(relay_ws_url);
            relay_client::send_message(&ws_url, &message, Duration::from_secs(wait_secs)).await?;
        }
    }

    Ok(())
}

fn relay_url() -> String {
    env::var("RELAY_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn relay_ws_url() -> String {
    env::var("RELAY_WS_URL").unwrap_or_else(|_| "ws://localhost:3000/ws".to_string())
}
