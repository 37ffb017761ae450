//! Binds the admin HTTP surface and the admin WebSocket event feed onto
//! [`signal_admin::AdminRouter`] / [`signal_admin::AdminEventBus`]. Axum
//! extractors are translated to and from the framework-agnostic
//! `AdminRequest`/`AdminResponse` pair; nothing downstream of that
//! boundary knows a web framework exists.

use crate::state::AppState;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use signal_admin::{AdminRequest, EventKind};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| {
            raw.split(';').find_map(|pair| {
                let (k, v) = pair.trim().split_once('=')?;
                (k == name).then(|| v.to_string())
            })
        })
}

async fn handle_admin_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| {
            url_encoded_pairs(q)
                .into_iter()
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let body_value = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let request = AdminRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        headers: lowercase_headers(&headers),
        query,
        cookie: extract_cookie(&headers, "admin_session"),
        body: body_value,
    };

    let response = state
        .admin_router
        .dispatch(state.admin.clone(), &state.admin.auth, request)
        .await;

    let mut builder = axum::http::Response::builder()
        .status(StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header("content-type", "application/json");
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(axum::body::Body::from(response.body.to_string()))
        .unwrap()
        .into_response()
}

/// Minimal `application/x-www-form-urlencoded`-style query decoder: axum's
/// `Query` extractor needs a concrete target type, but admin queries are
/// forwarded opaquely, so the pairs are parsed by hand instead.
fn url_encoded_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Some((percent_decode(k), percent_decode(v)))
        })
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Deserialize)]
struct AdminWsParams {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    Subscribe { events: Vec<String> },
}

async fn admin_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<AdminWsParams>,
) -> Response {
    let authenticated = match (&params.api_key, &params.token) {
        (Some(key), _) => state.admin.auth.check_api_key(key).valid,
        (None, Some(token)) => state.admin.auth.check_jwt(token).valid,
        (None, None) => false,
    };

    ws.on_upgrade(move |socket| handle_admin_ws(socket, state, authenticated))
}

async fn handle_admin_ws(socket: WebSocket, state: AppState, authenticated: bool) {
    use futures_util::{SinkExt, StreamExt};

    let (mut sink, mut stream) = socket.split();

    if !authenticated {
        let frame = WsMessage::Close(Some(axum::extract::ws::CloseFrame {
            code: 4001,
            reason: "authentication failed".into(),
        }));
        let _ = sink.send(frame).await;
        return;
    }
    let default_filter: HashSet<EventKind> = HashSet::from([
        EventKind::ClientConnected,
        EventKind::ClientDisconnected,
        EventKind::MetricsUpdate,
        EventKind::ErrorOccurred,
        EventKind::BanAdded,
        EventKind::BanRemoved,
        EventKind::AuditEntry,
    ]);
    let (subscriber_id, mut rx) = state.admin.events.subscribe(default_filter);
    let heartbeat = state.config.admin.websocket.heartbeat_interval_ms;

    let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let Ok(text) = serde_json::to_string(&envelope) else { continue };
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if sink.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(ClientCommand::Subscribe { events }) = serde_json::from_str(&text) {
                            let filter: HashSet<EventKind> = events
                                .iter()
                                .filter_map(|e| EventKind::parse(e))
                                .collect();
                            state.admin.events.update_filter(subscriber_id, filter);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.admin.events.unsubscribe(subscriber_id);
}

/// Mounts the admin HTTP surface (matched entirely by
/// [`signal_admin::AdminRouter`]) plus the admin WebSocket, under
/// `{adminBasePath}/{apiVersion}`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(admin_ws))
        .fallback(handle_admin_request)
}
