//! End-to-end smoke tests: bind the peer and admin routers on ephemeral
//! ports, drive them with a real WebSocket client and a real HTTP client.

use axum::Router;
use signal_server::config::Config;
use signal_server::state::AppState;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_peer_server(config: &Config) -> (std::net::SocketAddr, AppState) {
    let core = Arc::new(signal_core::Core::start(signal_core::CoreConfig::default()));
    let admin = signal_admin::AdminCore::attach(core.clone(), signal_admin::AdminConfig::default());
    let admin_router = Arc::new(signal_admin::build_router());
    let state = AppState {
        core,
        admin,
        admin_router,
        config: Arc::new(config.clone()),
    };

    let app: Router = signal_server::adapter::peer::router(&config.transport.path)
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn spawn_admin_server(state: AppState) -> std::net::SocketAddr {
    let app: Router = Router::new()
        .nest("/admin/v1", signal_server::adapter::admin::router())
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn peer_heartbeat_round_trips_over_a_real_websocket() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let config = Config::default();
    let (addr, state) = spawn_peer_server(&config).await;

    let url = format!(
        "ws://{addr}/conduit?key={}&id=alice&token=t1",
        config.transport.key
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    let open = ws.next().await.unwrap().unwrap();
    let open: serde_json::Value = serde_json::from_str(open.to_text().unwrap()).unwrap();
    assert_eq!(open["type"], "OPEN");

    ws.send(Message::Text(r#"{"type":"HEARTBEAT"}"#.into()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "HEARTBEAT");

    assert_eq!(state.core.metrics.connections_opened.get(), 1);
    assert_eq!(state.core.metrics.active_connections.get(), 1);
}

#[tokio::test]
async fn offline_destination_receives_queued_offer_on_connect() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let config = Config::default();
    let (addr, _state) = spawn_peer_server(&config).await;
    let key = &config.transport.key;

    let (mut alice, _) = tokio_tungstenite::connect_async(format!(
        "ws://{addr}/conduit?key={key}&id=alice&token=t1"
    ))
    .await
    .unwrap();
    alice.next().await.unwrap().unwrap(); // OPEN

    alice
        .send(Message::Text(
            r#"{"type":"OFFER","dst":"bob","payload":{"sdp":"v=0"}}"#.into(),
        ))
        .await
        .unwrap();

    let (mut bob, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/conduit?key={key}&id=bob&token=t2"))
            .await
            .unwrap();
    bob.next().await.unwrap().unwrap(); // OPEN

    let queued = tokio::time::timeout(Duration::from_secs(2), bob.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let queued: serde_json::Value = serde_json::from_str(queued.to_text().unwrap()).unwrap();
    assert_eq!(queued["type"], "OFFER");
    assert_eq!(queued["src"], "alice");
}

#[tokio::test]
async fn admin_health_requires_no_credentials_and_status_does() {
    let config = Config::default();
    let (_peer_addr, state) = spawn_peer_server(&config).await;
    let admin_addr = spawn_admin_server(state).await;

    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{admin_addr}/admin/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    let status = client
        .get(format!("http://{admin_addr}/admin/v1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(status.status(), 401);
}
