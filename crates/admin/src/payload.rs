//! Response DTOs for the admin routes. Kept separate from [`crate::core`]
//! so the façade's internals don't dictate wire shape.

use serde::Serialize;
use signal_core::Peer;
use std::sync::Arc;

#[derive(Serialize)]
pub struct ClientSummary {
    pub id: String,
    pub attached: bool,
    pub idle_ms: u128,
}

impl From<&Arc<Peer>> for ClientSummary {
    fn from(peer: &Arc<Peer>) -> Self {
        Self {
            id: peer.id.clone(),
            attached: peer.is_attached(),
            idle_ms: peer.idle_for().as_millis(),
        }
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime_ms: u128,
    pub clients_connected: usize,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub recipient_count: usize,
}

#[derive(Serialize)]
pub struct NonSensitiveConfig {
    pub rate_limit_enabled: bool,
    pub rate_limit_max_tokens: f64,
    pub rate_limit_refill_rate: f64,
    pub relay_enabled: bool,
    pub relay_max_message_size: usize,
}
