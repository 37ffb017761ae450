use std::fmt;

/// Error taxonomy for the admin control plane, parallel to
/// [`signal_core::CoreError`]. Variant names are kinds; the HTTP adapter
/// maps each to a status code and a JSON `{error}` body.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("viewer role cannot call {0}")]
    Forbidden(&'static str),

    #[error("session expired")]
    SessionExpired,

    #[error("no route matches {method} {path}")]
    NotFound { method: String, path: String },

    #[error("request body exceeds the 1 MiB limit")]
    BodyTooLarge,

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("client {0} not found")]
    ClientNotFound(String),

    #[error("core error: {0}")]
    Core(#[from] signal_core::CoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdminError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Forbidden(_) => 403,
            Self::SessionExpired => 401,
            Self::NotFound { .. } => 404,
            Self::BodyTooLarge => 400,
            Self::BadRequest(_) => 400,
            Self::ClientNotFound(_) => 404,
            Self::Core(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}

impl fmt::Display for AdminErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"error\":\"{}\"}}", self.0)
    }
}

/// A serializable `{error: ...}` body, built from an [`AdminError`] at the
/// boundary — the admin core itself never formats JSON.
pub struct AdminErrorBody(pub String);

impl From<&AdminError> for AdminErrorBody {
    fn from(err: &AdminError) -> Self {
        Self(err.to_string())
    }
}
