use std::fmt;

/// Why a string failed [`crate::validator::validate_id`],
/// [`crate::validator::validate_token`] or [`crate::validator::validate_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Empty,
    TooLong,
    InvalidChars,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::TooLong => "too long",
            Self::InvalidChars => "invalid characters",
        })
    }
}

/// Error taxonomy for the signaling core. Variant names are kinds, not wire
/// type names; the adapter layer is responsible for turning one of these
/// into a peer `ERROR` frame or an admin HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {field} {kind}")]
    Validation {
        field: &'static str,
        kind: ValidationErrorKind,
    },

    #[error("id already taken")]
    IdTaken,

    #[error("client api key rejected")]
    Auth,

    #[error("concurrent connection limit reached")]
    Capacity,

    #[error("rate limited")]
    RateLimited,

    #[error("relay payload too large")]
    RelayOversize,

    #[error("relay is disabled")]
    RelayDisabled,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable short key this error is counted under in
    /// `Metrics.errors[kind]` and the admin `errors.byType` map.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::IdTaken => "id_taken",
            Self::Auth => "auth",
            Self::Capacity => "capacity",
            Self::RateLimited => "rate_limited",
            Self::RelayOversize => "relay_oversize",
            Self::RelayDisabled => "relay_disabled",
            Self::SendFailed(_) => "send_failed",
            Self::Internal(_) => "message_handling",
        }
    }
}
