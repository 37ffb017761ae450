//! A declarative route table compiled once, independent of any HTTP
//! framework. Paths use `:name` segment parameters; each is compiled to a
//! `(Regex, param_names)` pair at registration time and matched in
//! registration order (spec §4.9). The adapter binary is the only thing
//! that ever constructs an [`AdminRequest`] from a real HTTP request.

use crate::auth::{AuthManager, AuthOutcome, Role};
use crate::core::AdminCore;
use crate::error::AdminError;

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AdminRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub cookie: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct AdminResponse {
    pub status: u16,
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl AdminResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HashMap::new(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn error(err: &AdminError) -> Self {
        Self::json(err.status_code(), serde_json::json!({ "error": err.to_string() }))
    }
}

pub struct HandlerContext {
    pub auth: AuthOutcome,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<AdminResponse, AdminError>> + Send>>;
pub type Handler = Arc<dyn Fn(Arc<AdminCore>, HandlerContext) -> HandlerFuture + Send + Sync>;

struct Route {
    method: &'static str,
    regex: Regex,
    param_names: Vec<String>,
    requires_auth: bool,
    handler: Handler,
}

/// Translates an `AdminRouter`-style path (`/clients/:id`) into an anchored
/// regex with one named capture per `:segment`.
fn compile_path(path: &str) -> (Regex, Vec<String>) {
    let mut pattern = String::from("^");
    let mut names = Vec::new();

    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            pattern.push('/');
        }
        if let Some(name) = segment.strip_prefix(':') {
            names.push(name.to_string());
            pattern.push_str("([^/]+)");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    pattern.push('$');

    (Regex::new(&pattern).expect("admin route pattern must compile"), names)
}

pub struct AdminRouter {
    routes: Vec<Route>,
}

impl AdminRouter {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn route(
        &mut self,
        method: &'static str,
        path: &str,
        requires_auth: bool,
        handler: Handler,
    ) {
        let (regex, param_names) = compile_path(path);
        self.routes.push(Route {
            method,
            regex,
            param_names,
            requires_auth,
            handler,
        });
    }

    fn find(&self, method: &str, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(captures) = route.regex.captures(path) {
                let params = route
                    .param_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), captures[i + 1].to_string()))
                    .collect();
                return Some((route, params));
            }
        }
        None
    }

    /// Resolves, authenticates, authorizes and invokes the matching route.
    /// Every branch here corresponds to a numbered rule in spec §4.9.
    pub async fn dispatch(
        &self,
        core: Arc<AdminCore>,
        auth_manager: &AuthManager,
        request: AdminRequest,
    ) -> AdminResponse {
        let Some((route, params)) = self.find(&request.method, &request.path) else {
            return AdminResponse::error(&AdminError::NotFound {
                method: request.method,
                path: request.path,
            });
        };

        let auth = if route.requires_auth {
            let outcome = auth_manager.authenticate_request(&request.headers, request.cookie.as_deref());
            if !outcome.valid {
                return AdminResponse::error(&AdminError::Unauthenticated);
            }
            if matches!(outcome.role, Some(Role::Viewer)) && !Role::Viewer.permits(&request.method) {
                return AdminResponse::error(&AdminError::Forbidden("mutating route"));
            }
            outcome
        } else {
            AuthOutcome {
                valid: false,
                user_id: None,
                role: None,
                error: None,
            }
        };

        let context = HandlerContext {
            auth,
            params,
            query: request.query,
            body: request.body,
        };

        match (route.handler)(core, context).await {
            Ok(response) => response,
            Err(err) => AdminResponse::error(&err),
        }
    }
}

impl Default for AdminRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_path_extracts_named_segments() {
        let (regex, names) = compile_path("/clients/:id/queue");
        assert_eq!(names, vec!["id"]);
        let caps = regex.captures("/clients/alice/queue").unwrap();
        assert_eq!(&caps[1], "alice");
        assert!(!regex.is_match("/clients/alice/queue/extra"));
    }

    #[test]
    fn compile_path_with_no_params_matches_exactly() {
        let (regex, names) = compile_path("/health");
        assert!(names.is_empty());
        assert!(regex.is_match("/health"));
        assert!(!regex.is_match("/health/"));
    }
}
