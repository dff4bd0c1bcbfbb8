//! HTTP and WebSocket access to the relay.

mod ws;

pub use ws::{describe_frame, listen, send_message};

use anyhow::Result;
use shared::HealthResponse;

/// GET `<base_url>/health`.
pub async fn health(base_url: &str) -> Result<HealthResponse> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let res = reqwest::get(&url).await?;
    if !res.status().is_success() {
        let status = res.status();
        let err: String = res.text().await.unwrap_or_default();
        anyhow::bail!("Health check failed ({}): {}", status, err);
    }
    Ok(res.json().await?)
}
