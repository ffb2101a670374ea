//! Wire protocol for the relay.
//!
//! Every frame in both directions is a JSON text envelope:
//!
//! ```json
//! {"event": "presence:join", "data": {...}}
//! ```
//!
//! Inbound frames decode into the closed [`ClientEvent`] set; anything that
//! does not decode is dropped at this boundary and never reaches the
//! registry. Outbound payload shapes live here as serialize-only structs so
//! the wire format has a single definition.
//!
//! Signal payloads (`webrtc:offer` / `webrtc:answer` / `webrtc:ice`) are
//! never inspected beyond the routing `to` field: they are captured as
//! [`RawValue`] and forwarded byte-for-byte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// User identifier as carried in credentials and the profile store.
pub type UserId = i64;

/// Server-assigned connection handle.
///
/// Unique per WebSocket connection, assigned at upgrade, never reused.
/// Serialized as the canonical hyphenated UUID string, which is how peers
/// address each other in signal payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Display profile snapshotted at admission and carried in presence events.
///
/// The `profile` member is an opaque JSON blob owned by the profile store;
/// the relay forwards it without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub profile: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Roster entry: the profile flattened, plus the member's connection handle.
///
/// `is_online` is always `true` for registry members (the registry only
/// tracks live connections); the field exists because roster consumers
/// key off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    #[serde(flatten)]
    pub profile: Profile,
    pub socket_id: ConnectionId,
    pub is_online: bool,
}

/// Event names used on the wire, in both directions.
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const PARTICIPANTS_LIST: &str = "participants:list";
    pub const PEERS_LIST: &str = "peers:list";
    pub const PRESENCE_JOIN: &str = "presence:join";
    pub const PRESENCE_LEAVE: &str = "presence:leave";
    pub const USER_STATUS: &str = "user:status";
    pub const USER_STATUS_CHANGE: &str = "user:status:change";
    pub const ROOM_FULL: &str = "room:full";
    pub const WEBRTC_OFFER: &str = "webrtc:offer";
    pub const WEBRTC_ANSWER: &str = "webrtc:answer";
    pub const WEBRTC_ICE: &str = "webrtc:ice";
}

/// The three relayed negotiation message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}

impl SignalKind {
    /// The wire event name, identical inbound and outbound.
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalKind::Offer => events::WEBRTC_OFFER,
            SignalKind::Answer => events::WEBRTC_ANSWER,
            SignalKind::Ice => events::WEBRTC_ICE,
        }
    }
}

/// Everything a connected client may ask of the relay.
///
/// The set is closed: frames that do not decode into one of these variants
/// are dropped (with a debug log) before any component sees them.
#[derive(Debug)]
pub enum ClientEvent {
    /// Request the connection handles of the other members of the caller's room.
    PeersList,
    /// Request the full roster of the caller's room.
    ParticipantsList,
    /// Announce a status change to the caller's room.
    Status { status: serde_json::Value },
    /// Forward a negotiation payload to one destination connection.
    Signal {
        kind: SignalKind,
        to: ConnectionId,
        payload: Box<RawValue>,
    },
}

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Frame has no data payload")]
    MissingData,

    /// Signal frames must carry a parseable `to` handle. A frame without one
    /// is dropped silently (the sender is never notified), matching the
    /// unknown-destination behavior.
    #[error("Signal frame has no usable destination")]
    MissingDestination,
}

#[derive(Deserialize)]
struct InboundFrame<'a> {
    #[serde(borrow)]
    event: Cow<'a, str>,
    #[serde(borrow)]
    data: Option<&'a RawValue>,
}

#[derive(Deserialize)]
struct SignalAddress {
    to: ConnectionId,
}

impl ClientEvent {
    /// Decodes one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: InboundFrame<'_> = serde_json::from_str(text)?;

        match frame.event.as_ref() {
            events::PEERS_LIST => Ok(ClientEvent::PeersList),
            events::PARTICIPANTS_LIST => Ok(ClientEvent::ParticipantsList),
            events::USER_STATUS => {
                let raw = frame.data.ok_or(FrameError::MissingData)?;
                let mut fields: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(raw.get())?;
                let status = fields.remove("status").unwrap_or_else(empty_object);
                Ok(ClientEvent::Status { status })
            }
            events::WEBRTC_OFFER | events::WEBRTC_ANSWER | events::WEBRTC_ICE => {
                let kind = match frame.event.as_ref() {
                    events::WEBRTC_OFFER => SignalKind::Offer,
                    events::WEBRTC_ANSWER => SignalKind::Answer,
                    _ => SignalKind::Ice,
                };
                let raw = frame.data.ok_or(FrameError::MissingDestination)?;
                let to = serde_json::from_str::<SignalAddress>(raw.get())
                    .map_err(|_| FrameError::MissingDestination)?
                    .to;
                Ok(ClientEvent::Signal {
                    kind,
                    to,
                    payload: raw.to_owned(),
                })
            }
            _ => Err(FrameError::UnknownEvent(frame.event.into_owned())),
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

/// Serializes one outbound frame. The caller owns delivery.
pub fn encode_frame<T: Serialize>(event: &str, data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope { event, data })
}

/// `connected` payload: confirmation sent to a freshly admitted connection.
#[derive(Debug, Serialize)]
pub struct ConnectedPayload<'a> {
    pub user: UserId,
    pub profile: &'a Profile,
}

/// `participants:list` payload. The subject connection is never included
/// in its own roster; `total` counts the entries actually listed.
#[derive(Debug, Serialize)]
pub struct ParticipantsPayload {
    pub participants: Vec<Participant>,
    pub total: usize,
}

/// `peers:list` payload: bare connection handles for mesh setup.
#[derive(Debug, Serialize)]
pub struct PeersPayload {
    pub peers: Vec<ConnectionId>,
}

/// `presence:join` / `presence:leave` payload.
#[derive(Debug, Serialize)]
pub struct PresencePayload<'a> {
    pub user: &'a Profile,
    pub socket_id: ConnectionId,
    pub timestamp: DateTime<Utc>,
}

/// `user:status:change` payload. `status` is whatever the announcing client
/// put under `status`, `{}` when it sent none.
#[derive(Debug, Serialize)]
pub struct StatusChangePayload<'a> {
    pub user: &'a Profile,
    pub socket_id: ConnectionId,
    pub status: &'a serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// `room:full` payload: informational notice sent before a capacity refusal.
#[derive(Debug, Serialize)]
pub struct RoomFullPayload {
    pub limit: usize,
}
