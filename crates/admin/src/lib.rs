//! The authenticated control plane over a [`signal_core::Realm`]: auth,
//! bans, audit log, the mutating action layer, the admin route table and
//! the event fan-out that feeds admin WebSocket/SSE subscribers.

pub mod actions;
pub mod audit;
pub mod auth;
pub mod ban;
pub mod core;
pub mod error;
pub mod events;
pub mod handlers;
pub mod payload;
pub mod router;

pub use actions::Actions;
pub use audit::{AuditEntry, AuditLogger};
pub use auth::{AuthConfig, AuthManager, AuthOutcome, Role};
pub use ban::{BanEntry, BanKind, BanManager, IpBanEnforcer};
pub use core::{AdminConfig, AdminCore};
pub use error::AdminError;
pub use events::{AdminEventBus, EventKind};
pub use handlers::build_router;
pub use router::{AdminRequest, AdminResponse, AdminRouter};
