//! Room membership registry and event fan-out.
//!
//! The registry is the only shared mutable state in the service. It keeps
//! bidirectional mappings: room → member handles (for broadcast) and
//! handle → connection entry (for routing and cleanup), guarded by a single
//! mutex. Every membership rule is enforced inside one critical section:
//! capacity is checked-and-committed atomically, and the outbound frames a
//! commit produces are enqueued into per-connection channels before the
//! section ends. Two commits observed by the same recipient therefore arrive
//! in commit order.
//!
//! Nothing here performs network I/O. Enqueuing into an unbounded channel
//! never blocks; each connection's writer task drains its channel outside
//! the lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::sync::mpsc;

use crate::errors::SbError;
use crate::observability::metrics;
use crate::protocol::{
    self, events, ConnectedPayload, ConnectionId, Participant, ParticipantsPayload, PeersPayload,
    PresencePayload, Profile, SignalKind, StatusChangePayload, UserId,
};

/// Sender half of a connection's outbound frame channel.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Receiver half, drained by the connection's writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<String>;

/// Encodes `data` and enqueues it on a single channel.
fn enqueue<T: Serialize>(tx: &OutboundSender, event: &'static str, data: &T) {
    match protocol::encode_frame(event, data) {
        Ok(frame) => {
            if tx.send(frame).is_err() {
                tracing::debug!(target: "sb.registry", event, "recipient channel closed");
            }
        }
        Err(error) => {
            tracing::error!(target: "sb.registry", %error, event, "failed to encode frame");
        }
    }
}

/// What the registry knew about a connection that just left.
#[derive(Debug)]
pub struct Departure {
    pub user_id: UserId,
    pub room_id: String,
    pub profile: Profile,
    pub joined_at: DateTime<Utc>,
}

struct ConnectionEntry {
    user_id: UserId,
    room_id: String,
    profile: Profile,
    joined_at: DateTime<Utc>,
    tx: OutboundSender,
}

#[derive(Default)]
struct RegistryInner {
    /// Connection handle → entry.
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// Room id → member handles in join order. A room exists iff non-empty.
    rooms: HashMap<String, Vec<ConnectionId>>,
}

/// Shared membership registry.
///
/// All mutations go through [`join`](Self::join) and
/// [`remove`](Self::remove); rooms come into existence on first join and
/// vanish on last leave.
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
    max_room_size: usize,
}

impl RoomRegistry {
    pub fn new(max_room_size: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_room_size,
        }
    }

    /// The per-room occupancy limit this registry enforces.
    pub fn max_room_size(&self) -> usize {
        self.max_room_size
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Critical sections hold no panicking operations; if one ever does
        // panic, the maps are still structurally valid, so keep serving.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admits `handle` into `room_id`, atomically with the capacity check.
    ///
    /// On success the joiner's welcome (`connected` + `participants:list`)
    /// and the `presence:join` notification for every existing member are
    /// enqueued before the registry lock is released, so no later commit can
    /// overtake them. On `RoomFull` nothing is recorded and nothing is sent.
    pub fn join(
        &self,
        handle: ConnectionId,
        user_id: UserId,
        room_id: &str,
        profile: Profile,
        tx: OutboundSender,
    ) -> Result<(), SbError> {
        let mut inner = self.lock();

        if inner.connections.contains_key(&handle) {
            return Err(SbError::Internal(format!(
                "connection {handle} already registered"
            )));
        }
        if inner.rooms.get(room_id).map_or(0, Vec::len) >= self.max_room_size {
            return Err(SbError::RoomFull {
                limit: self.max_room_size,
            });
        }

        let joined_at = Utc::now();
        let roster = inner.room_participants(room_id, None);

        inner.connections.insert(
            handle,
            ConnectionEntry {
                user_id,
                room_id: room_id.to_string(),
                profile: profile.clone(),
                joined_at,
                tx: tx.clone(),
            },
        );
        inner
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .push(handle);

        // Welcome first: once these frames sit in the joiner's channel, any
        // later commit in this room is observed after the roster snapshot.
        enqueue(
            &tx,
            events::CONNECTED,
            &ConnectedPayload {
                user: user_id,
                profile: &profile,
            },
        );
        let total = roster.len();
        enqueue(
            &tx,
            events::PARTICIPANTS_LIST,
            &ParticipantsPayload {
                participants: roster,
                total,
            },
        );

        inner.broadcast(
            room_id,
            Some(handle),
            events::PRESENCE_JOIN,
            &PresencePayload {
                user: &profile,
                socket_id: handle,
                timestamp: joined_at,
            },
        );

        metrics::record_presence_event("join");
        metrics::set_connections_active(inner.connections.len());
        metrics::set_rooms_active(inner.rooms.len());

        tracing::info!(
            target: "sb.registry",
            %handle,
            user_id,
            room_id,
            occupancy = inner.rooms.get(room_id).map_or(0, Vec::len),
            "connection joined room"
        );
        Ok(())
    }

    /// Removes `handle` and notifies the remaining members of its room.
    ///
    /// Idempotent: only the first removal returns a [`Departure`] and
    /// broadcasts `presence:leave`; later calls are no-ops.
    pub fn remove(&self, handle: ConnectionId) -> Option<Departure> {
        let mut inner = self.lock();

        let entry = inner.connections.remove(&handle)?;
        if let Some(members) = inner.rooms.get_mut(&entry.room_id) {
            members.retain(|member| *member != handle);
            if members.is_empty() {
                inner.rooms.remove(&entry.room_id);
            }
        }

        inner.broadcast(
            &entry.room_id,
            None,
            events::PRESENCE_LEAVE,
            &PresencePayload {
                user: &entry.profile,
                socket_id: handle,
                timestamp: Utc::now(),
            },
        );

        metrics::record_presence_event("leave");
        metrics::set_connections_active(inner.connections.len());
        metrics::set_rooms_active(inner.rooms.len());

        tracing::info!(
            target: "sb.registry",
            %handle,
            user_id = entry.user_id,
            room_id = %entry.room_id,
            session_secs = (Utc::now() - entry.joined_at).num_seconds(),
            "connection left room"
        );

        Some(Departure {
            user_id: entry.user_id,
            room_id: entry.room_id,
            profile: entry.profile,
            joined_at: entry.joined_at,
        })
    }

    /// Fans a `user:status:change` out to the sender's room, excluding the
    /// sender. Unknown senders are ignored.
    pub fn broadcast_status(&self, handle: ConnectionId, status: &serde_json::Value) {
        let inner = self.lock();

        let Some(entry) = inner.connections.get(&handle) else {
            tracing::debug!(target: "sb.registry", %handle, "status from unknown connection ignored");
            return;
        };

        inner.broadcast(
            &entry.room_id,
            Some(handle),
            events::USER_STATUS_CHANGE,
            &StatusChangePayload {
                user: &entry.profile,
                socket_id: handle,
                status,
                timestamp: Utc::now(),
            },
        );
        metrics::record_presence_event("status_change");
    }

    /// Forwards a signal payload verbatim to the destination connection.
    ///
    /// No room check: any live handle is a valid destination. Returns
    /// whether the payload was enqueued; the caller must not surface a miss
    /// to the sender.
    pub fn relay(&self, kind: SignalKind, to: ConnectionId, payload: Box<RawValue>) -> bool {
        let event = kind.event_name();
        let frame = match protocol::encode_frame(event, &payload) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::error!(target: "sb.registry", %error, event, "failed to encode relay frame");
                metrics::record_signal_relay(event, "encode_error");
                return false;
            }
        };

        let inner = self.lock();
        match inner.connections.get(&to) {
            Some(entry) => {
                let delivered = entry.tx.send(frame).is_ok();
                metrics::record_signal_relay(event, if delivered { "delivered" } else { "dropped" });
                delivered
            }
            None => {
                tracing::debug!(target: "sb.registry", %to, event, "relay to unknown destination dropped");
                metrics::record_signal_relay(event, "dropped");
                false
            }
        }
    }

    /// Handles of the other members of `handle`'s room. Empty for unknown
    /// handles.
    pub fn peers_of(&self, handle: ConnectionId) -> PeersPayload {
        let inner = self.lock();
        let peers = inner
            .connections
            .get(&handle)
            .and_then(|entry| inner.rooms.get(&entry.room_id))
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|member| *member != handle)
                    .collect()
            })
            .unwrap_or_default();
        PeersPayload { peers }
    }

    /// Roster of `handle`'s room, excluding `handle` itself. Empty for
    /// unknown handles.
    pub fn participants_of(&self, handle: ConnectionId) -> ParticipantsPayload {
        let inner = self.lock();
        let participants = inner
            .connections
            .get(&handle)
            .map(|entry| inner.room_participants(&entry.room_id, Some(handle)))
            .unwrap_or_default();
        let total = participants.len();
        ParticipantsPayload {
            participants,
            total,
        }
    }

    /// Number of live connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    /// Current occupancy of a room. Zero for rooms that do not exist.
    pub fn room_size(&self, room_id: &str) -> usize {
        self.lock().rooms.get(room_id).map_or(0, Vec::len)
    }
}

impl RegistryInner {
    /// Roster entries for a room, skipping `except` when given.
    fn room_participants(&self, room_id: &str, except: Option<ConnectionId>) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| Some(**member) != except)
                    .filter_map(|member| {
                        self.connections.get(member).map(|entry| Participant {
                            profile: entry.profile.clone(),
                            socket_id: *member,
                            is_online: true,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Encodes `data` once and enqueues it to every member of `room_id`
    /// except `skip`. Send failures mean the recipient's writer is already
    /// gone; its own disconnect will clean up.
    fn broadcast<T: Serialize>(
        &self,
        room_id: &str,
        skip: Option<ConnectionId>,
        event: &'static str,
        data: &T,
    ) {
        let Some(members) = self.rooms.get(room_id) else {
            return;
        };
        let frame = match protocol::encode_frame(event, data) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::error!(target: "sb.registry", %error, event, "failed to encode broadcast frame");
                return;
            }
        };
        for member in members {
            if Some(*member) == skip {
                continue;
            }
            if let Some(entry) = self.connections.get(member) {
                if entry.tx.send(frame.clone()).is_err() {
                    tracing::debug!(target: "sb.registry", recipient = %member, event, "recipient channel closed");
                }
            }
        }
    }
}
