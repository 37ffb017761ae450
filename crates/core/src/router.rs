//! Dispatches an inbound signaling frame by `type` to its handler. The
//! state here is trivial — the component is a dispatch table; all durable
//! state lives in the [`Realm`] it consults.

use crate::error::CoreError;
use crate::message::{Message, MessageKind};
use crate::rate_limiter::RateLimiter;
use crate::realm::{Peer, Realm};
use crate::validator::{safe_parse, validate_message};

use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub enabled: bool,
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_message_size: 64 * 1024,
        }
    }
}

/// What happened to an inbound frame, so the metrics layer can count it
/// without the router knowing anything about counters.
#[derive(Debug)]
pub enum RouterOutcome {
    /// Forwarded directly to an attached destination.
    Forwarded { dst: String },
    /// The destination was offline; the message was enqueued.
    Queued { dst: String },
    /// The sender's heartbeat/timestamp was updated; nothing was routed.
    HeartbeatAck,
    /// A frame type the router has no handler for, or relay traffic while
    /// relay is disabled. Not an error — just a no-op.
    Ignored,
}

/// Returned alongside [`RouterOutcome`] when the sender itself needs a
/// reply frame (an error, a relay-open ack, ...).
#[derive(Debug)]
pub struct RouteResult {
    pub outcome: RouterOutcome,
    pub reply_to_sender: Option<Message>,
}

fn payload_data_len(payload: &Option<Value>) -> usize {
    payload
        .as_ref()
        .and_then(|p| p.get("data"))
        .map(|d| d.to_string().len())
        .unwrap_or(0)
}

pub struct SignalingRouter;

impl SignalingRouter {
    /// The full `RateLimiter → Validator → dispatch` pipeline for one
    /// inbound text frame, exactly as laid out in spec §2's data flow.
    pub async fn handle_message(
        realm: &Realm,
        rate_limiter: &RateLimiter,
        relay: RelayConfig,
        max_bytes: usize,
        sender: &Arc<Peer>,
        raw: &str,
    ) -> Result<RouteResult, CoreError> {
        if !rate_limiter.try_consume(&sender.id) {
            return Err(CoreError::RateLimited);
        }

        let value = safe_parse(raw, max_bytes)?;
        let parsed = validate_message(value, max_bytes)?;

        sender.touch();

        if parsed.kind.is_relay() && !relay.enabled {
            return Ok(RouteResult {
                outcome: RouterOutcome::Ignored,
                reply_to_sender: None,
            });
        }

        let mut msg = Message {
            kind: parsed.kind,
            src: Some(sender.id.clone()),
            dst: parsed.dst.clone(),
            payload: parsed.payload,
        };

        match parsed.kind {
            MessageKind::Heartbeat => Ok(RouteResult {
                outcome: RouterOutcome::HeartbeatAck,
                reply_to_sender: Some(Message::new(MessageKind::Heartbeat)),
            }),

            MessageKind::Offer | MessageKind::Answer | MessageKind::Candidate | MessageKind::Leave => {
                Self::forward(realm, &mut msg).await
            }

            MessageKind::Relay | MessageKind::RelayClose => {
                if payload_data_len(&msg.payload) > relay.max_message_size {
                    realm.hooks.error(CoreError::RelayOversize.kind_tag());
                    return Ok(RouteResult {
                        outcome: RouterOutcome::Ignored,
                        reply_to_sender: Some(Message::error("relay payload too large")),
                    });
                }
                Self::forward(realm, &mut msg).await
            }

            MessageKind::RelayOpen => {
                if payload_data_len(&msg.payload) > relay.max_message_size {
                    realm.hooks.error(CoreError::RelayOversize.kind_tag());
                    return Ok(RouteResult {
                        outcome: RouterOutcome::Ignored,
                        reply_to_sender: Some(Message::error("relay payload too large")),
                    });
                }

                let mut result = Self::forward(realm, &mut msg).await?;
                result.reply_to_sender = Some(Message {
                    kind: MessageKind::RelayOpen,
                    src: msg.dst.clone(),
                    dst: Some(sender.id.clone()),
                    payload: msg.payload.clone(),
                });
                Ok(result)
            }

            _ => Ok(RouteResult {
                outcome: RouterOutcome::Ignored,
                reply_to_sender: None,
            }),
        }
    }

    /// Forwards `msg` to `msg.dst` if attached, otherwise enqueues it.
    async fn forward(realm: &Realm, msg: &mut Message) -> Result<RouteResult, CoreError> {
        let Some(dst) = msg.dst.clone() else {
            return Ok(RouteResult {
                outcome: RouterOutcome::Ignored,
                reply_to_sender: None,
            });
        };

        let src = msg.src.clone().unwrap_or_default();

        if let Some(peer) = realm.get_peer(&dst).await {
            if peer.is_attached() && peer.send(msg.to_json()).is_ok() {
                realm.hooks.message_relayed(&src, &dst);
                return Ok(RouteResult {
                    outcome: RouterOutcome::Forwarded { dst },
                    reply_to_sender: None,
                });
            }
        }

        let outcome = realm.queue.enqueue(&dst, msg.clone()).await;
        if outcome.dropped_oldest {
            realm.hooks.error("queue_overflow");
        }
        realm.hooks.message_queued(&src, &dst);
        Ok(RouteResult {
            outcome: RouterOutcome::Queued { dst },
            reply_to_sender: None,
        })
    }
}
