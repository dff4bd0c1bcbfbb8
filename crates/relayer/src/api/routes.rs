//! Route handlers.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use shared::{iso8601_now, ErrorBody, HealthResponse, ServiceInfo};

use crate::api::AppState;
use crate::error::RelayError;
use crate::relay::{Connection, ConnectionEvent, Membership, Payload, CLOSE_GOING_AWAY};

/// Keep-alive ping cadence for idle sockets.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Close code used when the socket vanished without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

/// How long to keep driving a closing socket so the close reply reaches the peer.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

// --- Admin ---

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: iso8601_now(),
        clients: state.relay.len(),
        service: state.config.service_name.clone(),
    })
}

pub async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: state.config.service_name.clone(),
        websocket: state.config.ws_path.clone(),
        health: "/health".to_string(),
        timestamp: iso8601_now(),
    })
}

// --- WebSocket ---

/// Origin check first, then upgrade. Plain HTTP requests get 426.
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = match headers.get(header::ORIGIN).map(|v| v.to_str()) {
        None => None,
        Some(Ok(o)) => Some(o.to_string()),
        Some(Err(_)) => {
            tracing::warn!("WebSocket upgrade from {} rejected: non-ASCII origin", remote);
            return StatusCode::FORBIDDEN.into_response();
        }
    };
    if !state.config.origin_policy.allows(origin.as_deref()) {
        tracing::warn!(
            "WebSocket connection rejected for origin {} from {}",
            origin.as_deref().unwrap_or("-"),
            remote
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!("Not a WebSocket upgrade from {}: {}", remote, rejection);
            return (
                StatusCode::UPGRADE_REQUIRED,
                Json(ErrorBody {
                    error: "Upgrade Required".to_string(),
                    message: "This endpoint requires WebSocket upgrade".to_string(),
                }),
            )
                .into_response();
        }
    };

    let max = state.config.max_payload_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_failed_upgrade(move |e| {
            tracing::warn!("WebSocket upgrade from {} failed: {}", remote, e);
        })
        .on_upgrade(move |socket| handle_socket(socket, state, remote, origin))
}

/// Register, then turn socket frames into [`ConnectionEvent`]s until the
/// registry says the connection is done.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    remote: SocketAddr,
    origin: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (conn, mut outbound) =
        Connection::channel(Some(remote), origin, state.config.outbound_buffer);

    let membership = Membership::join(state.relay.clone(), conn.clone());

    // Resolves to true once a server-initiated close frame went out.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_tx.send(msg).await.is_err() {
                return false;
            }
            if closing {
                return true;
            }
        }
        false
    });

    let mut ping_interval = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Set when the loop ends on a close handshake rather than a fault.
    let mut closing_handshake = false;

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(t))) => ConnectionEvent::Message(Payload::Text(t)),
                    Some(Ok(Message::Binary(b))) => ConnectionEvent::Message(Payload::Binary(b)),
                    // answered by the transport
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        closing_handshake = true;
                        ConnectionEvent::Close {
                            code: frame.as_ref().map(|f| f.code),
                            reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                        }
                    }
                    Some(Err(e)) => ConnectionEvent::Error(e.to_string()),
                    None => ConnectionEvent::Close {
                        code: Some(CLOSE_ABNORMAL),
                        reason: "connection dropped".to_string(),
                    },
                };
                if state.relay.dispatch(&conn, event).is_break() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if let Err(RelayError::ChannelClosed) = conn.push(Message::Ping(Bytes::new())) {
                    let _ = state
                        .relay
                        .dispatch(&conn, ConnectionEvent::Error("writer task ended".to_string()));
                    break;
                }
            }
            sent_close = &mut send_task => {
                let event = match sent_close {
                    Ok(true) => {
                        closing_handshake = true;
                        ConnectionEvent::Close {
                            code: Some(CLOSE_GOING_AWAY),
                            reason: "server shutting down".to_string(),
                        }
                    }
                    _ => ConnectionEvent::Error("socket write failed".to_string()),
                };
                let _ = state.relay.dispatch(&conn, event);
                break;
            }
        }
    }

    drop(membership);

    // The transport queues its close reply on read; keep reading until the
    // peer finishes the handshake so it sees a clean close, not a reset.
    if closing_handshake {
        let flushed = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, async {
            while ws_rx.next().await.is_some() {}
        })
        .await;
        if flushed.is_err() {
            tracing::debug!("Close handshake with {} did not finish in time", remote);
        }
    }
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use crate::api::{router, AppState};
    use crate::config::{Config, OriginPolicy};
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn app(config: Config) -> (Router, AppState) {
        let state = AppState::new(config);
        let peer = SocketAddr::from(([127, 0, 0, 1], 4000));
        let app = router(state.clone()).layer(MockConnectInfo(peer));
        (app, state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_live_clients() {
        let (app, state) = app(Config::for_test());
        let (conn, _rx) = crate::relay::Connection::channel(None, None, 4);
        state.relay.register(conn);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["clients"], 1);
        assert_eq!(body["service"], "test-relay");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn root_describes_endpoints() {
        let mut config = Config::for_test();
        config.ws_path = "/signal".to_string();
        let (app, _) = app(config);

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["websocket"], "/signal");
        assert_eq!(body["health"], "/health");
    }

    #[tokio::test]
    async fn plain_get_on_ws_path_is_upgrade_required() {
        let (app, _) = app(Config::for_test());

        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Upgrade Required");
    }

    #[tokio::test]
    async fn disallowed_origin_is_forbidden() {
        let (app, _) = app(Config::for_test());

        let req = Request::builder()
            .uri("/ws")
            .header("Origin", "https://evil.example")
            .header("Connection", "upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(
            response.status(),
            StatusCode::FORBIDDEN,
            "origin outside the policy must not reach the upgrade"
        );
    }

    #[tokio::test]
    async fn cors_echoes_allowed_origin_only() {
        let (app, _) = app(Config::for_test());

        let allowed = Request::builder()
            .uri("/health")
            .header("Origin", "https://demo.netlify.app")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://demo.netlify.app"
        );
        assert_eq!(
            response.headers().get("access-control-allow-credentials").unwrap(),
            "true"
        );

        let denied = Request::builder()
            .uri("/health")
            .header("Origin", "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(denied).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn any_policy_mirrors_origin() {
        let mut config = Config::for_test();
        config.origin_policy = OriginPolicy::Any;
        let (app, _) = app(config);

        let req = Request::builder()
            .uri("/health")
            .header("Origin", "https://anything.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://anything.example"
        );
    }
}
