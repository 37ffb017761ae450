//! Binds the peer-facing WebSocket and HTTP surface (spec §6) onto
//! [`signal_core::Core`]. This is the only module on the peer side that
//! knows axum exists; everything below [`signal_core::PeerSocket`] is
//! transport-agnostic.

use crate::state::AppState;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use signal_core::{CoreError, Message, MessageKind, Peer, PeerSocket};
use std::sync::Arc;
use tokio::sync::mpsc;

const OUTBOUND_CHANNEL_CAPACITY: usize = 128;

/// An mpsc-backed send handle bound to one live connection. `send` never
/// awaits a socket write — a full or closed channel fails immediately so
/// the router can fall back to the message queue (spec §5 backpressure).
struct WsPeerSocket {
    tx: mpsc::Sender<WsMessage>,
}

impl PeerSocket for WsPeerSocket {
    fn send(&self, text: String) -> Result<(), CoreError> {
        self.tx
            .try_send(WsMessage::Text(text.into()))
            .map_err(|_| CoreError::SendFailed("outbound channel full or closed".into()))
    }

    fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        let _ = self.tx.try_send(WsMessage::Close(Some(frame)));
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConduitParams {
    key: Option<String>,
    id: Option<String>,
    token: Option<String>,
}

fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|origin| allowed.iter().any(|a| a == origin))
        .unwrap_or(false)
}

async fn conduit(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConduitParams>,
    headers: HeaderMap,
) -> Response {
    if !origin_allowed(&headers, &state.config.transport.allowed_origins) {
        return StatusCode::FORBIDDEN.into_response();
    }

    if params.key.as_deref() != Some(state.config.transport.key.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let id = match params.id {
        Some(id) => id,
        None => state.core.realm.generate_id().await,
    };
    let token = params.token.unwrap_or_default();

    ws.on_upgrade(move |socket| handle_conduit(socket, state, id, token))
}

async fn handle_conduit(socket: WebSocket, state: AppState, id: String, token: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, WsMessage::Close(_));
            if sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
    });

    let socket_handle: Arc<dyn PeerSocket> = Arc::new(WsPeerSocket { tx: tx.clone() });

    let peer: Arc<Peer> = match state.core.realm.admit(&id, &token, socket_handle.clone()).await {
        Ok(outcome) => outcome.peer().clone(),
        Err(err) => {
            log::warn!("peer {id} rejected: {err}");
            let reply = Message::with_payload(MessageKind::IdTaken, serde_json::json!({ "id": id }));
            let _ = tx.send(WsMessage::Text(reply.to_json().into())).await;
            drop(tx);
            let _ = writer.await;
            return;
        }
    };

    log::info!("peer {} connected", peer.id);

    let open = Message::with_payload(MessageKind::Open, serde_json::json!({ "id": peer.id }));
    let _ = peer.send(open.to_json());

    for queued in state.core.realm.queue.drain(&peer.id).await {
        let _ = peer.send(queued.to_json());
    }

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => {
                if let Err(err) = state.core.handle_message(&peer, &text).await {
                    log::debug!("peer {} message rejected: {err}", peer.id);
                    let _ = peer.send(Message::error(err.to_string()).to_json());
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    if peer.detach_if_current(&socket_handle) {
        state.core.realm.remove_peer(&peer.id).await;
        state.core.rate_limiter.remove_client(&peer.id);
        log::info!("peer {} disconnected", peer.id);
    }

    drop(tx);
    let _ = writer.await;
}

async fn root_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn issue_id(
    axum::extract::Path(key): axum::extract::Path<String>,
    State(state): State<AppState>,
) -> Response {
    if key != state.config.transport.key {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let id = state.core.realm.generate_id().await;
    id.into_response()
}

async fn list_conduits(
    axum::extract::Path(key): axum::extract::Path<String>,
    State(state): State<AppState>,
) -> Response {
    if key != state.config.transport.key {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !state.config.transport.allow_discovery {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.core.realm.get_peer_ids().await).into_response()
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

/// Mounts the peer surface under `base_path`. `base_path` of `"/"` mounts
/// at the router root; any other value is treated as a path prefix.
pub fn router(base_path: &str) -> Router<AppState> {
    let base = base_path.trim_end_matches('/');
    let with_prefix = |suffix: &str| format!("{base}{suffix}");

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route(&with_prefix("/conduit"), get(conduit))
        .route(&with_prefix("/{key}/id"), get(issue_id))
        .route(&with_prefix("/{key}/conduits"), get(list_conduits));

    router = if base.is_empty() {
        router.route("/", get(root_info))
    } else {
        router.route(base, get(root_info)).route(&format!("{base}/"), get(root_info))
    };

    router
}
