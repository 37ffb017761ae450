//! The only part of this binary that imports axum: translates the core's
//! transport-agnostic contracts (`PeerSocket`, `AdminRequest`/`AdminResponse`)
//! to and from real HTTP/WebSocket traffic (spec §4.11).

pub mod admin;
pub mod peer;
