use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The enumerated `type` values a signaling frame may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Open,
    Leave,
    Candidate,
    Offer,
    Answer,
    Expire,
    Heartbeat,
    IdTaken,
    Error,
    Relay,
    RelayOpen,
    RelayClose,
    Goaway,
}

impl MessageKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "OPEN" => Self::Open,
            "LEAVE" => Self::Leave,
            "CANDIDATE" => Self::Candidate,
            "OFFER" => Self::Offer,
            "ANSWER" => Self::Answer,
            "EXPIRE" => Self::Expire,
            "HEARTBEAT" => Self::Heartbeat,
            "ID-TAKEN" => Self::IdTaken,
            "ERROR" => Self::Error,
            "RELAY" => Self::Relay,
            "RELAY_OPEN" => Self::RelayOpen,
            "RELAY_CLOSE" => Self::RelayClose,
            "GOAWAY" => Self::Goaway,
            _ => return None,
        })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Leave => "LEAVE",
            Self::Candidate => "CANDIDATE",
            Self::Offer => "OFFER",
            Self::Answer => "ANSWER",
            Self::Expire => "EXPIRE",
            Self::Heartbeat => "HEARTBEAT",
            Self::IdTaken => "ID-TAKEN",
            Self::Error => "ERROR",
            Self::Relay => "RELAY",
            Self::RelayOpen => "RELAY_OPEN",
            Self::RelayClose => "RELAY_CLOSE",
            Self::Goaway => "GOAWAY",
        }
    }

    /// Whether this kind is only meaningful when the relay transport is
    /// enabled.
    pub const fn is_relay(self) -> bool {
        matches!(self, Self::Relay | Self::RelayOpen | Self::RelayClose)
    }
}

impl Serialize for MessageKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MessageKind::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown type {s}")))
    }
}

/// A signaling frame, already validated. `src` is rewritten to the sender's
/// authenticated id by the router before it is ever forwarded or queued —
/// a peer can never spoof its origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            src: None,
            dst: None,
            payload: None,
        }
    }

    pub fn with_payload(kind: MessageKind, payload: Value) -> Self {
        Self {
            kind,
            src: None,
            dst: None,
            payload: Some(payload),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::with_payload(MessageKind::Error, serde_json::json!({ "msg": msg.into() }))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Message serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = Message {
            kind: MessageKind::Offer,
            src: Some("alice".into()),
            dst: Some("bob".into()),
            payload: Some(serde_json::json!({"sdp": "v=0"})),
        };

        let text = msg.to_json();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind, MessageKind::Offer);
        assert_eq!(back.src.as_deref(), Some("alice"));
    }

    #[test]
    fn unknown_type_fails_to_deserialize() {
        let err = serde_json::from_str::<Message>(r#"{"type":"NOPE"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn id_taken_uses_hyphen_not_underscore() {
        assert_eq!(MessageKind::IdTaken.as_str(), "ID-TAKEN");
    }
}
