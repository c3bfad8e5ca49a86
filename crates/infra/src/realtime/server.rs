//! WebSocket push endpoint
//!
//! Authentication happens upstream; the proxy forwards the authenticated
//! user in [`USER_HEADER`]. Each connection gets a writer task fed by an
//! unbounded queue registered with the [`ConnectionRegistry`], plus a ping
//! loop on the same queue.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use busysync_core::realtime::{parse_client_message, run_ping_loop, ClientMessage};
use busysync_core::ConnectionRegistry;
use busysync_domain::PushMessage;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = busysync_domain::constants::USER_ID_HEADER;

/// Shared state of the realtime routes.
#[derive(Clone)]
pub struct RealtimeState {
    pub registry: Arc<ConnectionRegistry>,
    pub ping_interval: Duration,
    /// Cancelled on server shutdown to close live sockets.
    pub shutdown: CancellationToken,
}

impl RealtimeState {
    pub fn new(registry: Arc<ConnectionRegistry>, ping_interval: Duration) -> Self {
        Self { registry, ping_interval, shutdown: CancellationToken::new() }
    }
}

/// `/ws` upgrades and `/health`.
pub fn router(state: RealtimeState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<RealtimeState>) -> Response {
    if state.registry.is_shut_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "shutting_down" })))
            .into_response();
    }
    Json(json!({ "status": "ok", "users": state.registry.user_count() })).into_response()
}

async fn ws_handler(
    headers: HeaderMap,
    State(state): State<RealtimeState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(user_id) = user_from_headers(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing authenticated user").into_response();
    };
    if state.registry.is_shut_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)),
        Err(rejection) => rejection.into_response(),
    }
}

fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(ToString::to_string)
}

async fn handle_socket(socket: WebSocket, user_id: String, state: RealtimeState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<PushMessage>();

    let connection_id = match state.registry.register(&user_id, tx.clone()) {
        Ok(id) => id,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Rejecting push connection");
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!(user_id = %user_id, error = %e, "Failed to send close frame");
            }
            return;
        }
    };
    info!(user_id = %user_id, connection_id = %connection_id, "Push connection opened");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize push message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Push socket already closed");
        }
    });
    let pinger = tokio::spawn(run_ping_loop(tx, state.ping_interval));

    loop {
        let frame = tokio::select! {
            () = state.shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => match parse_client_message(text.as_str()) {
                Ok(ClientMessage::Pong) => trace!(user_id = %user_id, "pong"),
                Ok(ClientMessage::Other(message)) => {
                    debug!(user_id = %user_id, event = %message.event, "Ignoring client message");
                }
                Err(e) => debug!(user_id = %user_id, error = %e, "Malformed client frame"),
            },
            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }

    state.registry.unregister(&user_id, connection_id);
    pinger.abort();
    // Writer ends once every sender is gone.
    if let Err(e) = writer.await {
        debug!(user_id = %user_id, error = %e, "Push writer task ended abnormally");
    }
    info!(user_id = %user_id, connection_id = %connection_id, "Push connection closed");
}
