//! Process-wide configuration: defaults merged with an optional JSON5
//! override file (spec §6). Every `serde(default = ...)` function here
//! mirrors the same per-field default-fn pattern the original TURN config
//! used — overriding one field in the file never loses the defaults for
//! its siblings.

use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::read_to_string;
use std::net::SocketAddr;

#[derive(Deserialize, Debug, Clone)]
pub struct Transport {
    #[serde(default = "Transport::listen")]
    pub listen: SocketAddr,
    #[serde(default = "Transport::path")]
    pub path: String,
    #[serde(default = "Transport::key")]
    pub key: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub require_secure: bool,
    #[serde(default = "Transport::allow_discovery")]
    pub allow_discovery: bool,
}

impl Transport {
    fn listen() -> SocketAddr {
        "0.0.0.0:9000".parse().unwrap()
    }

    fn path() -> String {
        "/".to_string()
    }

    fn key() -> String {
        "public".to_string()
    }

    fn allow_discovery() -> bool {
        false
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            path: Self::path(),
            key: Self::key(),
            allowed_origins: Vec::new(),
            require_secure: false,
            allow_discovery: Self::allow_discovery(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct Limits {
    #[serde(default = "Limits::concurrent_limit")]
    pub concurrent_limit: usize,
    #[serde(default = "Limits::alive_timeout_ms")]
    pub alive_timeout_ms: u64,
    #[serde(default = "Limits::expire_timeout_ms")]
    pub expire_timeout_ms: u64,
    #[serde(default = "Limits::cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    #[serde(default = "Limits::max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Limits {
    fn concurrent_limit() -> usize {
        10_000
    }

    fn alive_timeout_ms() -> u64 {
        60_000
    }

    fn expire_timeout_ms() -> u64 {
        300_000
    }

    fn cleanup_interval_ms() -> u64 {
        10_000
    }

    fn max_message_bytes() -> usize {
        64 * 1024
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            concurrent_limit: Self::concurrent_limit(),
            alive_timeout_ms: Self::alive_timeout_ms(),
            expire_timeout_ms: Self::expire_timeout_ms(),
            cleanup_interval_ms: Self::cleanup_interval_ms(),
            max_message_bytes: Self::max_message_bytes(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct RelayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "RelayConfig::max_message_size")]
    pub max_message_size: usize,
}

impl RelayConfig {
    fn max_message_size() -> usize {
        64 * 1024
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_message_size: Self::max_message_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::enabled")]
    pub enabled: bool,
    #[serde(default = "RateLimitConfig::max_tokens")]
    pub max_tokens: f64,
    #[serde(default = "RateLimitConfig::refill_rate")]
    pub refill_rate: f64,
}

impl RateLimitConfig {
    fn enabled() -> bool {
        true
    }

    fn max_tokens() -> f64 {
        20.0
    }

    fn refill_rate() -> f64 {
        10.0
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: Self::enabled(),
            max_tokens: Self::max_tokens(),
            refill_rate: Self::refill_rate(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AdminAuth {
    #[serde(default)]
    pub methods: Vec<String>,
    pub api_key: Option<String>,
    pub jwt_secret: Option<String>,
    #[serde(default = "AdminAuth::jwt_expires_in_secs")]
    pub jwt_expires_in_secs: u64,
    #[serde(default)]
    pub basic_credentials: HashMap<String, String>,
    #[serde(default = "AdminAuth::session_timeout_secs")]
    pub session_timeout_secs: u64,
}

impl AdminAuth {
    fn jwt_expires_in_secs() -> u64 {
        3600
    }

    fn session_timeout_secs() -> u64 {
        3600
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct AdminMetrics {
    #[serde(default = "AdminMetrics::retention_ms")]
    pub retention_ms: u64,
    #[serde(default = "AdminMetrics::snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "AdminMetrics::max_snapshots")]
    pub max_snapshots: usize,
}

impl AdminMetrics {
    fn retention_ms() -> u64 {
        24 * 3600 * 1000
    }

    fn snapshot_interval_ms() -> u64 {
        10_000
    }

    fn max_snapshots() -> usize {
        288
    }
}

impl Default for AdminMetrics {
    fn default() -> Self {
        Self {
            retention_ms: Self::retention_ms(),
            snapshot_interval_ms: Self::snapshot_interval_ms(),
            max_snapshots: Self::max_snapshots(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct AdminAudit {
    #[serde(default = "AdminAudit::enabled")]
    pub enabled: bool,
    #[serde(default = "AdminAudit::max_entries")]
    pub max_entries: usize,
}

impl AdminAudit {
    fn enabled() -> bool {
        true
    }

    fn max_entries() -> usize {
        1000
    }
}

impl Default for AdminAudit {
    fn default() -> Self {
        Self {
            enabled: Self::enabled(),
            max_entries: Self::max_entries(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AdminWebsocket {
    #[serde(default = "AdminWebsocket::enabled")]
    pub enabled: bool,
    #[serde(default = "AdminWebsocket::path")]
    pub path: String,
    #[serde(default = "AdminWebsocket::heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl AdminWebsocket {
    fn enabled() -> bool {
        true
    }

    fn path() -> String {
        "/ws".to_string()
    }

    fn heartbeat_interval_ms() -> u64 {
        30_000
    }
}

impl Default for AdminWebsocket {
    fn default() -> Self {
        Self {
            enabled: Self::enabled(),
            path: Self::path(),
            heartbeat_interval_ms: Self::heartbeat_interval_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Admin {
    #[serde(default = "Admin::listen")]
    pub listen: SocketAddr,
    #[serde(default = "Admin::path")]
    pub path: String,
    #[serde(default = "Admin::api_version")]
    pub api_version: String,
    #[serde(default)]
    pub auth: AdminAuth,
    #[serde(default)]
    pub metrics: AdminMetrics,
    #[serde(default)]
    pub audit: AdminAudit,
    #[serde(default)]
    pub websocket: AdminWebsocket,
}

impl Admin {
    fn listen() -> SocketAddr {
        "127.0.0.1:9001".parse().unwrap()
    }

    fn path() -> String {
        "/admin".to_string()
    }

    fn api_version() -> String {
        "v1".to_string()
    }
}

impl Default for Admin {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            path: Self::path(),
            api_version: Self::api_version(),
            auth: AdminAuth::default(),
            metrics: AdminMetrics::default(),
            audit: AdminAudit::default(),
            websocket: AdminWebsocket::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub admin: Admin,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// Path to a JSON5 configuration file. Missing flag or unreadable file
    /// falls back to built-in defaults for every field.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        let cfg_str = Cli::parse()
            .config
            .and_then(|path| read_to_string(path).ok())
            .unwrap_or_default();

        if cfg_str.trim().is_empty() {
            return Self::default();
        }

        serde_json5::from_str(&cfg_str).expect("failed to parse configuration file")
    }
}
