//! Shared process state threaded through every axum extractor.

use crate::config::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<signal_core::Core>,
    pub admin: Arc<signal_admin::AdminCore>,
    pub admin_router: Arc<signal_admin::AdminRouter>,
    pub config: Arc<Config>,
}
