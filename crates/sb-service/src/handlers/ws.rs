//! WebSocket endpoint: the persistent channel every client lives on.
//!
//! `GET /ws?token=...&room=...` upgrades first and admits second, so a
//! refusal can still say something in-band (the `room:full` notice) before
//! the close frame carrying the refusal code. After admission the socket
//! splits: a writer task drains the connection's outbound channel while
//! this task reads frames and dispatches them.
//!
//! Teardown always funnels through [`RoomRegistry::remove`], which is
//! idempotent, so a connection that errors, closes, or gets shut down
//! produces exactly one `presence:leave`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::errors::SbError;
use crate::protocol::{
    self, events, ClientEvent, ConnectionId, FrameError, RoomFullPayload,
};
use crate::registry::{OutboundSender, RoomRegistry};
use crate::routes::AppState;

/// Connection parameters carried as query string.
///
/// Both are optional at the type level so that absence flows into the
/// admission pipeline (and its refusal code) instead of a 400.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
    pub room: Option<String>,
}

/// Handler for GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params, remote))
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    params: WsParams,
    remote: SocketAddr,
) {
    let handle = ConnectionId::new();
    tracing::debug!(target: "sb.ws", %handle, %remote, "connection upgraded");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let admitted = crate::admission::admit(
        state.verifier.as_ref(),
        state.directory.as_ref(),
        &state.registry,
        handle,
        params.token.as_deref(),
        params.room.as_deref(),
        tx.clone(),
    )
    .await;

    let admitted = match admitted {
        Ok(admitted) => admitted,
        Err(refusal) => {
            refuse(socket, &refusal).await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    // Writer: drains the outbound channel. Ends once every sender is gone
    // and the queue is empty, then signals a normal closure.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: 1000,
                reason: "".into(),
            })))
            .await;
    });

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => dispatch(&state.registry, handle, &text, &tx),
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(target: "sb.ws", %handle, "binary frame ignored");
                    }
                    // Ping/pong is handled by the protocol layer.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!(target: "sb.ws", %handle, "client closed");
                        break;
                    }
                    Some(Err(error)) => {
                        tracing::debug!(target: "sb.ws", %handle, %error, "read failed");
                        break;
                    }
                    None => break,
                }
            }
            () = state.shutdown.cancelled() => {
                tracing::debug!(target: "sb.ws", %handle, "closing for shutdown");
                break;
            }
        }
    }

    if state.registry.remove(handle).is_some() {
        tracing::debug!(
            target: "sb.ws",
            %handle,
            user_id = admitted.user_id,
            "connection torn down"
        );
    }
    // Dropping our sender lets the writer drain the tail and close.
    drop(tx);
    let _ = writer.await;
}

/// Sends the refusal to a never-admitted connection and closes it.
///
/// Capacity refusals get the `room:full` notice first so the client learns
/// the limit; everything else is just the close frame, whose code and
/// reason identify the gate that refused.
async fn refuse(mut socket: WebSocket, refusal: &SbError) {
    if let SbError::RoomFull { limit } = refusal {
        match protocol::encode_frame(events::ROOM_FULL, &RoomFullPayload { limit: *limit }) {
            Ok(frame) => {
                let _ = socket.send(Message::Text(frame)).await;
            }
            Err(error) => {
                tracing::error!(target: "sb.ws", %error, "failed to encode room:full notice");
            }
        }
    }

    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: refusal.close_code(),
            reason: refusal.client_message().into(),
        })))
        .await;
}

/// Routes one decoded frame to the registry. Frames that do not decode are
/// dropped here; the sender is never notified.
fn dispatch(registry: &RoomRegistry, handle: ConnectionId, text: &str, tx: &OutboundSender) {
    match ClientEvent::parse(text) {
        Ok(ClientEvent::PeersList) => {
            reply(tx, events::PEERS_LIST, &registry.peers_of(handle));
        }
        Ok(ClientEvent::ParticipantsList) => {
            reply(tx, events::PARTICIPANTS_LIST, &registry.participants_of(handle));
        }
        Ok(ClientEvent::Status { status }) => {
            registry.broadcast_status(handle, &status);
        }
        Ok(ClientEvent::Signal { kind, to, payload }) => {
            registry.relay(kind, to, payload);
        }
        Err(FrameError::UnknownEvent(name)) => {
            tracing::debug!(target: "sb.ws", %handle, event = %name, "unknown event ignored");
        }
        Err(error) => {
            tracing::debug!(target: "sb.ws", %handle, %error, "frame dropped");
        }
    }
}

fn reply<T: serde::Serialize>(tx: &OutboundSender, event: &'static str, data: &T) {
    match protocol::encode_frame(event, data) {
        Ok(frame) => {
            let _ = tx.send(frame);
        }
        Err(error) => {
            tracing::error!(target: "sb.ws", %error, event, "failed to encode reply");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::Profile;
    use serde_json::Value;

    fn member(registry: &RoomRegistry, user: i64, room: &str) -> (ConnectionId, crate::registry::OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionId::new();
        registry
            .join(
                handle,
                user,
                room,
                Profile {
                    id: user,
                    name: format!("user-{user}"),
                    email: format!("user-{user}@example.com"),
                    profile: None,
                    created_at: None,
                },
                tx,
            )
            .expect("join succeeds");
        (handle, rx)
    }

    fn recv_event(rx: &mut crate::registry::OutboundReceiver) -> Value {
        serde_json::from_str(&rx.try_recv().expect("frame queued")).unwrap()
    }

    #[test]
    fn test_dispatch_replies_to_roster_queries() {
        let registry = RoomRegistry::new(10);
        let (alice, mut alice_rx) = member(&registry, 1, "r1");
        let (_bob, _bob_rx) = member(&registry, 2, "r1");
        while alice_rx.try_recv().is_ok() {}

        let (tx, mut reply_rx) = mpsc::unbounded_channel();
        dispatch(&registry, alice, r#"{"event":"peers:list"}"#, &tx);
        let peers = recv_event(&mut reply_rx);
        assert_eq!(peers["event"], "peers:list");
        assert_eq!(peers["data"]["peers"].as_array().unwrap().len(), 1);

        dispatch(&registry, alice, r#"{"event":"participants:list"}"#, &tx);
        let roster = recv_event(&mut reply_rx);
        assert_eq!(roster["event"], "participants:list");
        assert_eq!(roster["data"]["total"], 1);
    }

    #[test]
    fn test_dispatch_routes_status_and_signals() {
        let registry = RoomRegistry::new(10);
        let (alice, _alice_rx) = member(&registry, 1, "r1");
        let (bob, mut bob_rx) = member(&registry, 2, "r1");
        while bob_rx.try_recv().is_ok() {}

        let (tx, _reply_rx) = mpsc::unbounded_channel();
        dispatch(
            &registry,
            alice,
            r#"{"event":"user:status","data":{"status":{"hand":"up"}}}"#,
            &tx,
        );
        let change = recv_event(&mut bob_rx);
        assert_eq!(change["event"], "user:status:change");
        assert_eq!(change["data"]["status"]["hand"], "up");

        let signal = format!(r#"{{"event":"webrtc:ice","data":{{"to":"{bob}","candidate":"c0"}}}}"#);
        dispatch(&registry, alice, &signal, &tx);
        let relayed = recv_event(&mut bob_rx);
        assert_eq!(relayed["event"], "webrtc:ice");
        assert_eq!(relayed["data"]["candidate"], "c0");
    }

    #[test]
    fn test_dispatch_drops_undecodable_frames() {
        let registry = RoomRegistry::new(10);
        let (alice, _alice_rx) = member(&registry, 1, "r1");
        let (_bob, mut bob_rx) = member(&registry, 2, "r1");
        while bob_rx.try_recv().is_ok() {}

        let (tx, mut reply_rx) = mpsc::unbounded_channel();
        dispatch(&registry, alice, "garbage", &tx);
        dispatch(&registry, alice, r#"{"event":"admin:reboot"}"#, &tx);
        dispatch(&registry, alice, r#"{"event":"webrtc:offer","data":{"sdp":"x"}}"#, &tx);

        assert!(reply_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }
}
