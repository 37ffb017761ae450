pub mod adapter;
pub mod config;
pub mod shutdown;
pub mod state;

use config::Config;
use state::AppState;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

fn core_config(config: &Config) -> signal_core::CoreConfig {
    signal_core::CoreConfig {
        rate_limit: signal_core::RateLimitConfig {
            enabled: config.rate_limit.enabled,
            max_tokens: config.rate_limit.max_tokens,
            refill_rate: config.rate_limit.refill_rate,
        },
        relay: signal_core::RelayConfig {
            enabled: config.relay.enabled,
            max_message_size: config.relay.max_message_size,
        },
        max_message_bytes: config.limits.max_message_bytes,
        alive_timeout: Duration::from_millis(config.limits.alive_timeout_ms),
        sweep_interval: Duration::from_millis(config.limits.cleanup_interval_ms),
        expire_after: Duration::from_millis(config.limits.expire_timeout_ms),
        metrics_series_capacity: config.admin.metrics.max_snapshots,
        metrics_max_snapshots: config.admin.metrics.max_snapshots,
        metrics_retention: Duration::from_millis(config.admin.metrics.retention_ms),
        ..Default::default()
    }
}

fn auth_config(auth: &config::AdminAuth) -> signal_admin::AuthConfig {
    let has = |name: &str| auth.methods.iter().any(|m| m == name);
    signal_admin::AuthConfig {
        api_key_enabled: has("apiKey"),
        api_key: auth.api_key.clone(),
        jwt_enabled: has("jwt"),
        jwt_secret: auth.jwt_secret.clone(),
        basic_enabled: has("basic"),
        basic_credentials: auth.basic_credentials.clone(),
        session_timeout: Duration::from_secs(auth.session_timeout_secs),
    }
}

fn admin_config(config: &Config) -> signal_admin::AdminConfig {
    signal_admin::AdminConfig {
        auth: auth_config(&config.admin.auth),
        audit_enabled: config.admin.audit.enabled,
        audit_max_entries: config.admin.audit.max_entries,
        event_channel_capacity: 64,
        session_purge_interval: Duration::from_secs(60),
        snapshot_interval: Duration::from_millis(config.admin.metrics.snapshot_interval_ms),
    }
}

/// Builds the realm, the admin control plane, and the axum router pair,
/// runs until a shutdown signal arrives, then drives the GOAWAY-then-close
/// sequence. Exposed separately from `main` so integration tests can drive
/// a full process without going through `std::process`.
pub async fn server_main(config: Arc<Config>) -> anyhow::Result<()> {
    let core = Arc::new(signal_core::Core::start(core_config(&config)));
    let admin = signal_admin::AdminCore::attach(core.clone(), admin_config(&config));
    let admin_router = Arc::new(signal_admin::build_router());

    let state = AppState {
        core,
        admin,
        admin_router,
        config: config.clone(),
    };

    let peer_app: Router = adapter::peer::router(&config.transport.path)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let peer_listener = tokio::net::TcpListener::bind(config.transport.listen).await?;
    log::info!("peer listener bound on {}", config.transport.listen);
    let peer_server =
        axum::serve(peer_listener, peer_app).with_graceful_shutdown(shutdown::wait_for_signal());

    let admin_prefix = format!(
        "{}/{}",
        config.admin.path.trim_end_matches('/'),
        config.admin.api_version
    );
    let admin_app: Router = Router::new()
        .nest(&admin_prefix, adapter::admin::router())
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let admin_listener = tokio::net::TcpListener::bind(config.admin.listen).await?;
    log::info!("admin listener bound on {}", config.admin.listen);
    let admin_server =
        axum::serve(admin_listener, admin_app).with_graceful_shutdown(shutdown::wait_for_signal());

    let shutdown_state = state.clone();
    tokio::select! {
        result = peer_server => { result?; }
        result = admin_server => { result?; }
    }

    shutdown::graceful_shutdown(&shutdown_state).await;
    Ok(())
}
