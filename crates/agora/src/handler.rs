//! Per-connection handler: registration, the two loops, and teardown.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Allocate a participant id and register in the lobby
//!   2. Spawn the outbound loop (queued pushes → wire)
//!   3. Run the inbound loop (wire → requests → registry or room)
//!   4. Tear down: whichever loop ends first departs the participant,
//!      tells its last route it left, and closes the transport

use std::sync::Arc;

use agora_protocol::{Codec, ParticipantId, Push, Request};
use agora_room::{Participant, RoomEvent, Route};
use agora_transport::{Connection, TransportError};
use tokio::sync::mpsc;

use crate::AgoraError;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<T, C>(
    conn: T,
    state: Arc<ServerState<C>>,
) -> Result<(), AgoraError>
where
    T: Connection<Error = TransportError>,
    C: Codec,
{
    let conn = Arc::new(conn);
    let participant_id = ParticipantId(state.participant_ids.next());
    let (participant, outbound) = Participant::channel(
        participant_id,
        conn.peer_addr(),
        state.outbound_queue,
    );
    tracing::info!(%participant_id, peer = %conn.peer_addr(), "participant connected");

    if let Err(e) = state.registry.connect(participant.clone()).await {
        teardown(&*conn, &participant).await;
        return Err(e.into());
    }

    let writer = tokio::spawn(outbound_loop(
        Arc::clone(&conn),
        participant.clone(),
        outbound,
        Arc::clone(&state),
    ));

    let result = inbound_loop(&*conn, &participant, &state).await;
    teardown(&*conn, &participant).await;
    let _ = writer.await;

    tracing::info!(%participant_id, "participant disconnected");
    result
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

async fn inbound_loop<T, C>(
    conn: &T,
    participant: &Participant,
    state: &ServerState<C>,
) -> Result<(), AgoraError>
where
    T: Connection<Error = TransportError>,
    C: Codec,
{
    let participant_id = participant.id();

    loop {
        let read = tokio::select! {
            biased;
            _ = participant.departed() => return Ok(()),
            read = tokio::time::timeout(state.read_timeout, conn.recv()) => read,
        };

        let data = match read {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%participant_id, "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::info!(%participant_id, "connection timed out");
                return Ok(());
            }
        };

        let request = match Request::decode(&state.codec, &data) {
            Ok(request) => request,
            Err(e) if e.is_skippable() => {
                tracing::debug!(%participant_id, error = %e, "ignoring request");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        dispatch(participant, state, request).await?;
    }
}

/// Turns one request into registry or room traffic.
async fn dispatch<C: Codec>(
    participant: &Participant,
    state: &ServerState<C>,
    request: Request,
) -> Result<(), AgoraError> {
    let participant_id = participant.id();

    match request {
        Request::SetName { name } => {
            tracing::debug!(%participant_id, %name, "name set");
            participant.set_name(name);
            participant.push(Push::SetName { ok: true });
        }
        Request::CreateRoom { title, total } => {
            state
                .registry
                .create_room(Some(participant_id), title, total)
                .await?;
        }
        Request::JoinRoom { id } => {
            let outcome = state.registry.join(id, participant.clone()).await?;
            tracing::debug!(%participant_id, room_id = %id, ?outcome, "join");
        }
        Request::LeaveRoom => {
            participant.route().leave(participant).await;
            state.registry.connect(participant.clone()).await?;
        }
        Request::ChatMessage { content } => {
            let event = RoomEvent::Chat {
                sender: participant_id,
                name: participant.name(),
                content,
            };
            to_room(participant, event).await;
        }
        Request::Whisper { to, content } => {
            let event = RoomEvent::Whisper {
                from: participant_id,
                to,
                name: participant.name(),
                content,
            };
            to_room(participant, event).await;
        }
        Request::BanUser { ban_id } => {
            let event = RoomEvent::Ban {
                actor: participant_id,
                target: ban_id,
            };
            to_room(participant, event).await;
        }
    }

    Ok(())
}

/// Room-scoped requests are only meaningful inside a room.
async fn to_room(participant: &Participant, event: RoomEvent) {
    let participant_id = participant.id();
    match participant.route() {
        Route::Room(room) => {
            if let Err(e) = room.broadcast(event).await {
                tracing::debug!(%participant_id, error = %e, "room request not delivered");
            }
        }
        _ => {
            tracing::debug!(%participant_id, "not in a room, dropping request");
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

async fn outbound_loop<T, C>(
    conn: Arc<T>,
    participant: Participant,
    mut outbound: mpsc::Receiver<Push>,
    state: Arc<ServerState<C>>,
) where
    T: Connection<Error = TransportError>,
    C: Codec,
{
    let participant_id = participant.id();

    loop {
        let push = tokio::select! {
            biased;
            _ = participant.departed() => break,
            push = outbound.recv() => match push {
                Some(push) => push,
                None => break,
            },
        };

        let bytes = match push.encode(&state.codec) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%participant_id, error = %e, "failed to encode push");
                continue;
            }
        };

        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%participant_id, error = %e, "send failed");
            break;
        }
    }

    teardown(&*conn, &participant).await;
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Departs the participant and closes the transport. Only the first call
/// does anything.
async fn teardown<T: Connection>(conn: &T, participant: &Participant) {
    let Some(previous) = participant.depart() else {
        return;
    };
    previous.leave(participant).await;
    if let Err(e) = conn.close().await {
        tracing::debug!(participant_id = %participant.id(), error = %e, "close failed");
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Handler tests against an in-memory connection, so the inbound and
    //! outbound loops can be driven without a socket.

    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use agora_protocol::JsonCodec;
    use agora_room::{RoomConfig, Sequence, spawn_registry};
    use tokio::sync::Mutex;

    use super::*;

    struct MockConnection {
        inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        closed: Arc<AtomicBool>,
    }

    impl Connection for MockConnection {
        type Error = TransportError;

        async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
            self.outbound.send(data.to_vec()).map_err(|_| {
                TransportError::ConnectionClosed("peer gone".into())
            })
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(self.inbound.lock().await.recv().await)
        }

        async fn close(&self) -> Result<(), Self::Error> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn peer_addr(&self) -> SocketAddr {
            "127.0.0.1:50000".parse().unwrap()
        }
    }

    struct Peer {
        to_server: mpsc::Sender<Vec<u8>>,
        from_server: mpsc::UnboundedReceiver<Vec<u8>>,
        closed: Arc<AtomicBool>,
    }

    impl Peer {
        async fn say(&self, raw: &str) {
            self.to_server.send(raw.as_bytes().to_vec()).await.unwrap();
        }

        async fn hear(&mut self) -> (String, serde_json::Value) {
            let bytes = tokio::time::timeout(
                Duration::from_secs(1),
                self.from_server.recv(),
            )
            .await
            .expect("timed out waiting for the server")
            .expect("server hung up");
            let (tag, body) = agora_protocol::split(&bytes).unwrap();
            (tag.to_string(), serde_json::from_slice(body).unwrap())
        }

        async fn hear_tag(&mut self, tag: &str) -> serde_json::Value {
            loop {
                let (got, body) = self.hear().await;
                if got == tag {
                    return body;
                }
            }
        }
    }

    fn state(read_timeout: Duration) -> Arc<ServerState<JsonCodec>> {
        Arc::new(ServerState {
            registry: spawn_registry(RoomConfig::default()),
            codec: JsonCodec,
            participant_ids: Sequence::new(),
            read_timeout,
            outbound_queue: 32,
        })
    }

    fn spawn_peer(
        state: &Arc<ServerState<JsonCodec>>,
    ) -> (Peer, tokio::task::JoinHandle<Result<(), AgoraError>>) {
        let (to_server, inbound) = mpsc::channel(16);
        let (outbound, from_server) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let conn = MockConnection {
            inbound: Mutex::new(inbound),
            outbound,
            closed: Arc::clone(&closed),
        };
        let task = tokio::spawn(handle_connection(conn, Arc::clone(state)));
        (
            Peer {
                to_server,
                from_server,
                closed,
            },
            task,
        )
    }

    #[tokio::test]
    async fn test_connection_is_greeted_with_room_list() {
        let state = state(Duration::from_secs(60));
        let (mut peer, _task) = spawn_peer(&state);

        let (tag, body) = peer.hear().await;
        assert_eq!(tag, "roomList");
        assert_eq!(body["rooms"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_set_name_is_acknowledged() {
        let state = state(Duration::from_secs(60));
        let (mut peer, _task) = spawn_peer(&state);

        peer.say("setName\r\n\r\n{\"name\":\"ann\"}").await;

        let body = peer.hear_tag("setName").await;
        assert_eq!(body, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_unknown_tag_is_skipped() {
        let state = state(Duration::from_secs(60));
        let (mut peer, _task) = spawn_peer(&state);

        peer.say("dance\r\n\r\n{}").await;
        peer.say("setName\r\n\r\n{\"name\":\"ann\"}").await;

        assert_eq!(peer.hear_tag("setName").await["ok"], true);
    }

    #[tokio::test]
    async fn test_malformed_body_ends_connection() {
        let state = state(Duration::from_secs(60));
        let (peer, task) = spawn_peer(&state);

        peer.say("setName\r\n\r\n{not json").await;

        let result = task.await.unwrap();
        assert!(matches!(result, Err(AgoraError::Protocol(_))));
        assert!(peer.closed.load(Ordering::SeqCst));
        assert!(state.registry.snapshot().await.unwrap().lobby.is_empty());
    }

    #[tokio::test]
    async fn test_chat_outside_room_is_dropped() {
        let state = state(Duration::from_secs(60));
        let (mut peer, _task) = spawn_peer(&state);

        peer.say("chatMessage\r\n\r\n{\"content\":\"anyone?\"}").await;
        peer.say("setName\r\n\r\n{\"name\":\"ann\"}").await;

        // The next thing after the greeting is the setName ack, not a chat.
        let (tag, _) = peer.hear().await;
        assert_eq!(tag, "roomList");
        let (tag, _) = peer.hear().await;
        assert_eq!(tag, "setName");
    }

    #[tokio::test]
    async fn test_create_join_and_leave_room() {
        let state = state(Duration::from_secs(60));
        let (mut peer, _task) = spawn_peer(&state);

        peer.say("setName\r\n\r\n{\"name\":\"ann\"}").await;
        peer.say("createRoom\r\n\r\n{\"title\":\"General\",\"total\":2}")
            .await;
        let list = peer.hear_tag("roomList").await; // greeting
        assert_eq!(list["rooms"], serde_json::json!([]));
        let list = peer.hear_tag("roomList").await;
        assert_eq!(list["rooms"][0]["roomMaker"], 0);

        peer.say("joinRoom\r\n\r\n{\"id\":0}").await;
        assert_eq!(
            peer.hear_tag("joinRoom").await,
            serde_json::json!({"id": 0, "ok": true})
        );

        peer.say("leaveRoom").await;
        // The lobby greeting may race the room's own leave bookkeeping;
        // the room reports back once it has processed the leave.
        loop {
            let list = peer.hear_tag("roomList").await;
            if list["rooms"][0]["current"] == 0 {
                break;
            }
        }
        let snapshot = state.registry.snapshot().await.unwrap();
        assert_eq!(snapshot.lobby, vec![ParticipantId(0)]);
    }

    #[tokio::test]
    async fn test_peer_close_removes_participant_from_room() {
        let state = state(Duration::from_secs(60));
        let room_id = state.registry.create_room(None, "General", 2).await.unwrap();
        let (mut peer, task) = spawn_peer(&state);

        peer.say("joinRoom\r\n\r\n{\"id\":0}").await;
        peer.hear_tag("userList").await;

        drop(peer.to_server);
        task.await.unwrap().unwrap();

        assert!(peer.closed.load(Ordering::SeqCst));
        let room = state.registry.lookup(room_id).await.unwrap().unwrap();
        let info = room.info().await.unwrap();
        assert!(info.members.is_empty());
        assert_eq!(info.current, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_times_out() {
        let state = state(Duration::from_secs(30));
        let (peer, task) = spawn_peer(&state);

        let result = task.await.unwrap();
        assert!(result.is_ok());
        assert!(peer.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_write_tears_down_reader() {
        let state = state(Duration::from_secs(60));
        let (peer, task) = spawn_peer(&state);

        // With the write side gone, the greeting fails to send and the
        // outbound loop tears the participant down.
        drop(peer.from_server);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader should stop after teardown")
            .unwrap()
            .unwrap();
        assert!(peer.closed.load(Ordering::SeqCst));
    }
}
