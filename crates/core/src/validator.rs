//! Structural checks on ids, tokens, keys and inbound JSON frames.
//!
//! Patterns are hand-rolled rather than pulled in through a regex engine:
//! the character classes are small and fixed, and a byte-at-a-time scan
//! avoids paying for regex compilation on the hot path of every inbound
//! frame.

use crate::error::{CoreError, ValidationErrorKind};
use crate::message::MessageKind;
use serde_json::Value;

const MAX_LEN: usize = 64;
const MAX_PAYLOAD_DEPTH: usize = 10;

fn is_id_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

fn is_token_char(c: u8) -> bool {
    is_id_char(c) || c == b'='
}

fn validate_pattern(
    field: &'static str,
    value: &str,
    allowed: fn(u8) -> bool,
) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation {
            field,
            kind: ValidationErrorKind::Empty,
        });
    }

    if value.len() > MAX_LEN {
        return Err(CoreError::Validation {
            field,
            kind: ValidationErrorKind::TooLong,
        });
    }

    if !value.bytes().all(allowed) {
        return Err(CoreError::Validation {
            field,
            kind: ValidationErrorKind::InvalidChars,
        });
    }

    Ok(())
}

/// `^[A-Za-z0-9_-]{1,64}$`
pub fn validate_id(value: &str) -> Result<(), CoreError> {
    validate_pattern("id", value, is_id_char)
}

/// `^[A-Za-z0-9_-]{1,64}$`, identical character class to an id.
pub fn validate_key(value: &str) -> Result<(), CoreError> {
    validate_pattern("key", value, is_id_char)
}

/// `^[A-Za-z0-9_=-]{1,64}$` — accepts base64 padding.
pub fn validate_token(value: &str) -> Result<(), CoreError> {
    validate_pattern("token", value, is_token_char)
}

fn json_depth(value: &Value, limit: usize) -> usize {
    match value {
        Value::Array(items) => {
            let mut max = 0;
            for item in items {
                max = max.max(json_depth(item, limit));
                if max >= limit {
                    return max;
                }
            }
            1 + max
        }
        Value::Object(map) => {
            let mut max = 0;
            for item in map.values() {
                max = max.max(json_depth(item, limit));
                if max >= limit {
                    return max;
                }
            }
            1 + max
        }
        _ => 0,
    }
}

/// Rejects a raw frame before it is even parsed if it exceeds `max_bytes`.
pub fn safe_parse(text: &str, max_bytes: usize) -> Result<Value, CoreError> {
    if text.len() > max_bytes {
        return Err(CoreError::Validation {
            field: "message",
            kind: ValidationErrorKind::TooLong,
        });
    }

    serde_json::from_str(text).map_err(|_| CoreError::Validation {
        field: "message",
        kind: ValidationErrorKind::InvalidChars,
    })
}

/// A signaling frame after `validate_message` has confirmed its shape.
pub struct ParsedMessage {
    pub kind: MessageKind,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub payload: Option<Value>,
}

/// Requires: an object, a `type` drawn from [`MessageKind`], and a `payload`
/// whose nesting depth is at most 10 (arrays and objects both count one
/// level).
pub fn validate_message(value: Value, max_bytes: usize) -> Result<ParsedMessage, CoreError> {
    let serialized_len = value.to_string().len();
    if serialized_len > max_bytes {
        return Err(CoreError::Validation {
            field: "message",
            kind: ValidationErrorKind::TooLong,
        });
    }

    let Value::Object(mut map) = value else {
        return Err(CoreError::Validation {
            field: "message",
            kind: ValidationErrorKind::InvalidChars,
        });
    };

    let kind = match map.remove("type") {
        Some(Value::String(s)) => MessageKind::parse(&s).ok_or(CoreError::Validation {
            field: "type",
            kind: ValidationErrorKind::InvalidChars,
        })?,
        _ => {
            return Err(CoreError::Validation {
                field: "type",
                kind: ValidationErrorKind::Empty,
            })
        }
    };

    let payload = map.remove("payload");
    if let Some(p) = &payload {
        if json_depth(p, MAX_PAYLOAD_DEPTH) > MAX_PAYLOAD_DEPTH {
            return Err(CoreError::Validation {
                field: "payload",
                kind: ValidationErrorKind::TooLong,
            });
        }
    }

    let src = match map.remove("src") {
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            return Err(CoreError::Validation {
                field: "src",
                kind: ValidationErrorKind::InvalidChars,
            })
        }
        None => None,
    };

    let dst = match map.remove("dst") {
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            return Err(CoreError::Validation {
                field: "dst",
                kind: ValidationErrorKind::InvalidChars,
            })
        }
        None => None,
    };

    Ok(ParsedMessage {
        kind,
        src,
        dst,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_id() {
        assert!(validate_id("alice-01_x").is_ok());
    }

    #[test]
    fn rejects_empty_id() {
        assert!(matches!(
            validate_id("   "),
            Err(CoreError::Validation {
                kind: ValidationErrorKind::Empty,
                ..
            })
        ));
    }

    #[test]
    fn rejects_overlong_id() {
        let long = "a".repeat(65);
        assert!(matches!(
            validate_id(&long),
            Err(CoreError::Validation {
                kind: ValidationErrorKind::TooLong,
                ..
            })
        ));
    }

    #[test]
    fn rejects_unicode() {
        assert!(matches!(
            validate_id("café"),
            Err(CoreError::Validation {
                kind: ValidationErrorKind::InvalidChars,
                ..
            })
        ));
    }

    #[test]
    fn token_accepts_base64_padding() {
        assert!(validate_token("QUJDRA==").is_ok());
    }

    #[test]
    fn max_length_boundary_is_inclusive() {
        let exactly_64 = "a".repeat(64);
        assert!(validate_id(&exactly_64).is_ok());
    }

    #[test]
    fn message_requires_object() {
        assert!(validate_message(Value::String("nope".into()), 1024).is_err());
    }

    #[test]
    fn message_rejects_unknown_type() {
        let v = serde_json::json!({"type": "BOGUS"});
        assert!(validate_message(v, 1024).is_err());
    }

    #[test]
    fn message_rejects_deep_payload() {
        let mut nested = serde_json::json!(1);
        for _ in 0..12 {
            nested = serde_json::json!([nested]);
        }
        let v = serde_json::json!({"type": "OFFER", "payload": nested});
        assert!(validate_message(v, 1 << 20).is_err());
    }

    #[test]
    fn message_accepts_shallow_payload() {
        let v = serde_json::json!({"type": "HEARTBEAT", "payload": {"a": [1, 2, 3]}});
        let parsed = validate_message(v, 1024).unwrap();
        assert_eq!(parsed.kind, MessageKind::Heartbeat);
    }

    #[test]
    fn safe_parse_rejects_oversize_text() {
        let text = "x".repeat(100);
        assert!(safe_parse(&text, 10).is_err());
    }
}
