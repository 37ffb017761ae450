//! Three independent credential checks composed into one
//! `authenticate_request`, plus the session store backing the admin cookie.
//! The API key comparison is constant-time on purpose — see
//! [`constant_time_eq`].

use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
}

impl Role {
    /// Only idempotent (`GET`) methods are permitted for a viewer (spec §4.9).
    pub fn permits(self, method: &str) -> bool {
        match self {
            Self::Admin => true,
            Self::Viewer => method.eq_ignore_ascii_case("GET"),
        }
    }
}

pub struct AuthOutcome {
    pub valid: bool,
    pub user_id: Option<String>,
    pub role: Option<Role>,
    pub error: Option<String>,
}

impl AuthOutcome {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            user_id: None,
            role: None,
            error: Some(error.into()),
        }
    }

    fn ok(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            valid: true,
            user_id: Some(user_id.into()),
            role: Some(role),
            error: None,
        }
    }
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    sub: String,
    role: String,
    exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key_enabled: bool,
    pub api_key: Option<String>,
    pub jwt_enabled: bool,
    pub jwt_secret: Option<String>,
    pub basic_enabled: bool,
    /// username -> password, checked with a constant-time comparison.
    pub basic_credentials: HashMap<String, String>,
    pub session_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_enabled: false,
            api_key: None,
            jwt_enabled: false,
            jwt_secret: None,
            basic_enabled: false,
            basic_credentials: HashMap::new(),
            session_timeout: Duration::from_secs(3600),
        }
    }
}

struct Session {
    user_id: String,
    role: Role,
    expires_at: Instant,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    timeout: Duration,
    purger: RwLock<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
            purger: RwLock::new(None),
        }
    }

    pub fn create(&self, user_id: &str, role: Role) -> String {
        let mut bytes = [0u8; 24];
        rand::rng().fill_bytes(&mut bytes);
        let id = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes);

        self.sessions.write().insert(
            id.clone(),
            Session {
                user_id: user_id.to_string(),
                role,
                expires_at: Instant::now() + self.timeout,
            },
        );
        id
    }

    pub fn validate(&self, session_id: &str) -> AuthOutcome {
        let sessions = self.sessions.read();
        match sessions.get(session_id) {
            Some(session) if session.expires_at > Instant::now() => {
                AuthOutcome::ok(session.user_id.clone(), session.role)
            }
            Some(_) => AuthOutcome::invalid("session expired"),
            None => AuthOutcome::invalid("no such session"),
        }
    }

    pub fn revoke(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.sessions.write().retain(|_, s| s.expires_at > now);
    }

    /// Starts the background purge loop. Idempotent: a second call replaces
    /// the previous task.
    pub fn start_purger(self: &std::sync::Arc<Self>, interval: Duration) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.purge_expired();
            }
        });
        if let Some(old) = self.purger.write().replace(handle) {
            old.abort();
        }
    }

    pub fn stop_purger(&self) {
        if let Some(handle) = self.purger.write().take() {
            handle.abort();
        }
    }
}

/// Bearer-JWT, Bearer-Basic, `X-API-Key`, or `admin_session` cookie — tried
/// in that order (spec §4.8).
pub struct AuthManager {
    config: AuthConfig,
    pub sessions: std::sync::Arc<SessionManager>,
}

impl AuthManager {
    pub fn new(config: AuthConfig) -> Self {
        let sessions = std::sync::Arc::new(SessionManager::new(config.session_timeout));
        Self { config, sessions }
    }

    pub fn check_api_key(&self, presented: &str) -> AuthOutcome {
        if !self.config.api_key_enabled {
            return AuthOutcome::invalid("api key auth disabled");
        }
        match &self.config.api_key {
            Some(expected) if constant_time_eq(expected, presented) => {
                AuthOutcome::ok("api-key-user", Role::Admin)
            }
            _ => AuthOutcome::invalid("api key rejected"),
        }
    }

    pub fn check_jwt(&self, token: &str) -> AuthOutcome {
        if !self.config.jwt_enabled {
            return AuthOutcome::invalid("jwt auth disabled");
        }
        let Some(secret) = &self.config.jwt_secret else {
            return AuthOutcome::invalid("jwt auth misconfigured");
        };

        let decoded = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
            &jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256),
        );

        match decoded {
            Ok(data) => {
                let role = match data.claims.role.as_str() {
                    "admin" => Role::Admin,
                    _ => Role::Viewer,
                };
                AuthOutcome::ok(data.claims.sub, role)
            }
            Err(e) => AuthOutcome::invalid(format!("jwt rejected: {e}")),
        }
    }

    pub fn check_basic(&self, username: &str, password: &str) -> AuthOutcome {
        if !self.config.basic_enabled {
            return AuthOutcome::invalid("basic auth disabled");
        }
        match self.config.basic_credentials.get(username) {
            Some(expected) if constant_time_eq(expected, password) => {
                AuthOutcome::ok(username, Role::Admin)
            }
            _ => AuthOutcome::invalid("basic credentials rejected"),
        }
    }

    /// `headers` is a simple lowercase-keyed map, as produced by the
    /// adapter's request translation; `cookie` is the raw `admin_session`
    /// cookie value, if any.
    pub fn authenticate_request(
        &self,
        headers: &HashMap<String, String>,
        cookie: Option<&str>,
    ) -> AuthOutcome {
        if let Some(auth) = headers.get("authorization") {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                let outcome = self.check_jwt(token);
                if outcome.valid {
                    return outcome;
                }
            }
            if let Some(basic) = auth.strip_prefix("Basic ") {
                if let Ok(decoded) = base64::Engine::decode(
                    &base64::engine::general_purpose::STANDARD,
                    basic,
                ) {
                    if let Ok(text) = String::from_utf8(decoded) {
                        if let Some((user, pass)) = text.split_once(':') {
                            let outcome = self.check_basic(user, pass);
                            if outcome.valid {
                                return outcome;
                            }
                        }
                    }
                }
            }
        }

        if let Some(key) = headers.get("x-api-key") {
            let outcome = self.check_api_key(key);
            if outcome.valid {
                return outcome;
            }
        }

        if let Some(session_id) = cookie {
            return self.sessions.validate(session_id);
        }

        AuthOutcome::invalid("no credential presented")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            api_key_enabled: true,
            api_key: Some("s3cr3t".into()),
            ..Default::default()
        }
    }

    #[test]
    fn api_key_match_grants_admin_role() {
        let auth = AuthManager::new(config());
        let outcome = auth.check_api_key("s3cr3t");
        assert!(outcome.valid);
        assert_eq!(outcome.role, Some(Role::Admin));
    }

    #[test]
    fn api_key_mismatch_is_rejected() {
        let auth = AuthManager::new(config());
        assert!(!auth.check_api_key("wrong").valid);
    }

    #[test]
    fn viewer_role_permits_only_get() {
        assert!(Role::Viewer.permits("GET"));
        assert!(!Role::Viewer.permits("DELETE"));
        assert!(Role::Admin.permits("DELETE"));
    }

    #[test]
    fn expired_session_is_rejected() {
        let manager = SessionManager::new(Duration::from_millis(0));
        let id = manager.create("alice", Role::Admin);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!manager.validate(&id).valid);
    }

    #[test]
    fn session_roundtrips_user_and_role() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.create("alice", Role::Viewer);
        let outcome = manager.validate(&id);
        assert!(outcome.valid);
        assert_eq!(outcome.user_id.as_deref(), Some("alice"));
        assert_eq!(outcome.role, Some(Role::Viewer));
    }

    #[test]
    fn authenticate_request_falls_back_through_methods() {
        let mut cfg = config();
        cfg.api_key_enabled = false;
        let auth = AuthManager::new(cfg);
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), "anything".to_string());
        let outcome = auth.authenticate_request(&headers, None);
        assert!(!outcome.valid);
    }
}
