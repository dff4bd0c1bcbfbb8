//! HTTP surface: health/info endpoints and the WebSocket transport.

mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, request::Parts, HeaderName, HeaderValue, Method};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{Config, OriginPolicy};
use crate::relay::Registry;

/// Shared app state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Registry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            relay: Arc::new(Registry::new()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.origin_policy);

    Router::new()
        .route("/", get(routes::info))
        .route("/health", get(routes::health))
        .route(&state.config.ws_path, get(routes::ws_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(policy: &OriginPolicy) -> CorsLayer {
    let allow_origin = match policy {
        OriginPolicy::Any => AllowOrigin::mirror_request(),
        OriginPolicy::List { .. } => {
            let policy = policy.clone();
            AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
                origin
                    .to_str()
                    .map(|o| policy.allows(Some(o)))
                    .unwrap_or(false)
            })
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

/// Serve until `shutdown` resolves, then close every WebSocket with "going
/// away" and wait up to the configured grace period for them to leave.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let relay = state.relay.clone();
    let grace = Duration::from_secs(state.config.shutdown_grace_secs);
    let app = router(state);

    let draining = relay.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        let asked = draining.close_all();
        tracing::info!("Stopped accepting; closing {} connection(s)", asked);
    })
    .await?;

    drain(&relay, grace).await;
    Ok(())
}

async fn drain(relay: &Registry, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    while !relay.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !relay.is_empty() {
        tracing::warn!(
            "{} connection(s) still open after {:?}, exiting anyway",
            relay.len(),
            grace
        );
    }
}
