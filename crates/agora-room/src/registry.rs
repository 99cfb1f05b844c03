//! Registry actor: the lobby and the list of live rooms.
//!
//! The registry is the only place rooms are created and the only place joins
//! are arbitrated. It owns two pieces of state nobody else touches:
//!
//! - `rooms`: every live room, in creation order (that is the `roomList`
//!   order clients see);
//! - `lobby`: participants that are connected but not in a room.
//!
//! Connections reach it through a [`RegistryHandle`] (bounded mailbox, so a
//! flood of requests applies back-pressure to the sender). Rooms report back
//! through a [`RegistryLink`] over an unbounded channel: neither actor ever
//! waits on the other, which keeps the actor graph free of wait cycles.

use std::collections::BTreeMap;
use std::sync::Arc;

use agora_protocol::{ParticipantId, Push, RoomEntry, RoomId};
use tokio::sync::{mpsc, oneshot};

use crate::occupancy::Reservation;
use crate::room::{NewRoom, spawn_room};
use crate::{Participant, RoomConfig, RoomError, RoomHandle, Route, Sequence};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How the registry settled a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Handed to the room; the room answers with `joinRoom ok:true`.
    Entered,
    /// The room had no free slot.
    Full,
    /// No live room with that id.
    NotFound,
    /// The participant was not in the lobby (already in a room).
    NotInLobby,
    /// The participant disconnected while the join was in flight.
    Departed,
}

/// What the registry currently holds.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Live rooms, in creation order.
    pub rooms: Vec<RoomEntry>,
    /// Lobby members, in id order.
    pub lobby: Vec<ParticipantId>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

enum RegistryCommand {
    Connect {
        participant: Participant,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        participant_id: ParticipantId,
    },
    CreateRoom {
        maker: Option<ParticipantId>,
        title: String,
        total: u32,
        reply: oneshot::Sender<RoomId>,
    },
    Join {
        room_id: RoomId,
        participant: Participant,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<RegistrySnapshot>,
    },
    Lookup {
        room_id: RoomId,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
}

/// What rooms report to the registry.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RegistryNotice {
    /// Membership changed; the lobby's `roomList` is stale.
    RoomChanged(RoomId),
    /// The room closed itself and must be dropped from the list.
    RoomClosed(RoomId),
}

/// A room's non-blocking line back to its registry.
#[derive(Debug, Clone)]
pub(crate) struct RegistryLink {
    notices: mpsc::UnboundedSender<RegistryNotice>,
}

impl RegistryLink {
    pub(crate) fn room_changed(&self, room_id: RoomId) {
        let _ = self.notices.send(RegistryNotice::RoomChanged(room_id));
    }

    pub(crate) fn room_closed(&self, room_id: RoomId) {
        let _ = self.notices.send(RegistryNotice::RoomClosed(room_id));
    }
}

// ---------------------------------------------------------------------------
// RegistryHandle
// ---------------------------------------------------------------------------

/// Handle to the running registry actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    commands: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Puts a participant in the lobby and sends it the room list.
    ///
    /// Returns once the registry has processed the request, so anything the
    /// caller does next already sees the participant routed to the lobby.
    pub async fn connect(&self, participant: Participant) -> Result<(), RoomError> {
        self.request(|reply| RegistryCommand::Connect { participant, reply })
            .await
    }

    /// Removes a participant from the lobby. Unknown ids are ignored.
    pub async fn disconnect(&self, participant_id: ParticipantId) -> Result<(), RoomError> {
        self.send(RegistryCommand::Disconnect { participant_id })
            .await
    }

    /// Creates a room and returns its id.
    ///
    /// `total` is clamped to the configured maximum. `maker` is `None` for
    /// rooms created by an operator rather than a participant.
    pub async fn create_room(
        &self,
        maker: Option<ParticipantId>,
        title: impl Into<String>,
        total: u32,
    ) -> Result<RoomId, RoomError> {
        let title = title.into();
        self.request(|reply| RegistryCommand::CreateRoom {
            maker,
            title,
            total,
            reply,
        })
        .await
    }

    /// Asks to move a lobby participant into a room.
    ///
    /// Refusals are also pushed to the participant as `joinRoom ok:false`.
    pub async fn join(
        &self,
        room_id: RoomId,
        participant: Participant,
    ) -> Result<JoinOutcome, RoomError> {
        self.request(|reply| RegistryCommand::Join {
            room_id,
            participant,
            reply,
        })
        .await
    }

    /// The current room list and lobby membership.
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RoomError> {
        self.request(|reply| RegistryCommand::Snapshot { reply }).await
    }

    /// Finds a live room by id.
    pub async fn lookup(&self, room_id: RoomId) -> Result<Option<RoomHandle>, RoomError> {
        self.request(|reply| RegistryCommand::Lookup { room_id, reply })
            .await
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), RoomError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| RoomError::RegistryUnavailable)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx.await.map_err(|_| RoomError::RegistryUnavailable)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct RoomSlot {
    handle: RoomHandle,
    title: String,
    maker: Option<ParticipantId>,
}

impl RoomSlot {
    fn entry(&self) -> RoomEntry {
        let occupancy = self.handle.occupancy();
        RoomEntry {
            id: self.handle.room_id(),
            title: self.title.clone(),
            total: occupancy.total(),
            current: occupancy.current(),
            maker: self.maker,
        }
    }
}

struct RegistryActor {
    config: RoomConfig,
    // Weak, so the actor itself does not keep its mailbox open.
    commands_tx: mpsc::WeakSender<RegistryCommand>,
    link: RegistryLink,
    rooms: Vec<RoomSlot>,
    lobby: BTreeMap<ParticipantId, Participant>,
    next_room_id: u64,
    messages: Arc<Sequence>,
    commands: mpsc::Receiver<RegistryCommand>,
    notices: mpsc::UnboundedReceiver<RegistryNotice>,
}

impl RegistryActor {
    async fn run(mut self) {
        tracing::info!(max_capacity = self.config.max_capacity, "registry started");

        loop {
            tokio::select! {
                biased;
                Some(notice) = self.notices.recv() => self.handle_notice(notice),
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        tracing::info!("registry stopped");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Connect { participant, reply } => {
                self.handle_connect(participant);
                let _ = reply.send(());
            }
            RegistryCommand::Disconnect { participant_id } => {
                if self.lobby.remove(&participant_id).is_some() {
                    tracing::debug!(%participant_id, "left lobby");
                }
            }
            RegistryCommand::CreateRoom {
                maker,
                title,
                total,
                reply,
            } => {
                let room_id = self.handle_create(maker, title, total);
                let _ = reply.send(room_id);
            }
            RegistryCommand::Join {
                room_id,
                participant,
                reply,
            } => {
                let outcome = self.handle_join(room_id, participant);
                let _ = reply.send(outcome);
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(RegistrySnapshot {
                    rooms: self.room_entries(),
                    lobby: self.lobby.keys().copied().collect(),
                });
            }
            RegistryCommand::Lookup { room_id, reply } => {
                let _ = reply.send(self.find(room_id).map(|slot| slot.handle.clone()));
            }
        }
    }

    fn handle_notice(&mut self, notice: RegistryNotice) {
        match notice {
            RegistryNotice::RoomChanged(room_id) => {
                tracing::trace!(%room_id, lobby = self.lobby.len(), "room changed, refreshing lobby");
                self.broadcast_room_list();
            }
            RegistryNotice::RoomClosed(room_id) => {
                let before = self.rooms.len();
                self.rooms.retain(|slot| slot.handle.room_id() != room_id);
                if self.rooms.len() != before {
                    tracing::info!(%room_id, rooms = self.rooms.len(), "room removed");
                    self.broadcast_room_list();
                }
            }
        }
    }

    fn handle_connect(&mut self, participant: Participant) {
        let participant_id = participant.id();
        let Some(commands) = self.commands_tx.upgrade() else {
            return;
        };
        if !participant.rebind(Route::Lobby(RegistryHandle { commands })) {
            tracing::debug!(%participant_id, "connect from departed participant ignored");
            return;
        }
        participant.push(Push::RoomList {
            rooms: self.room_entries(),
        });
        self.lobby.insert(participant_id, participant);
        tracing::debug!(%participant_id, lobby = self.lobby.len(), "entered lobby");
    }

    fn handle_create(
        &mut self,
        maker: Option<ParticipantId>,
        title: String,
        requested: u32,
    ) -> RoomId {
        let room_id = RoomId(self.next_room_id);
        self.next_room_id += 1;
        let total = requested.min(self.config.max_capacity);

        let handle = spawn_room(
            NewRoom {
                room_id,
                title: title.clone(),
                total,
                maker,
            },
            self.config.clone(),
            Arc::clone(&self.messages),
            self.link.clone(),
        );
        self.rooms.push(RoomSlot {
            handle,
            title,
            maker,
        });
        tracing::info!(%room_id, total, requested, maker = ?maker, "room created");

        self.broadcast_room_list();
        room_id
    }

    fn handle_join(&mut self, room_id: RoomId, participant: Participant) -> JoinOutcome {
        let participant_id = participant.id();
        let outcome = self.arbitrate(room_id, &participant);
        tracing::debug!(%participant_id, %room_id, ?outcome, "join settled");

        match outcome {
            JoinOutcome::Entered | JoinOutcome::Departed => {
                self.lobby.remove(&participant_id);
                self.broadcast_room_list();
            }
            JoinOutcome::Full | JoinOutcome::NotFound | JoinOutcome::NotInLobby => {
                participant.push(Push::join_rejected());
            }
        }
        outcome
    }

    fn arbitrate(&self, room_id: RoomId, participant: &Participant) -> JoinOutcome {
        if !self.lobby.contains_key(&participant.id()) {
            return JoinOutcome::NotInLobby;
        }
        let Some(slot) = self.find(room_id) else {
            return JoinOutcome::NotFound;
        };
        match slot.handle.occupancy().reserve() {
            Reservation::Granted => {}
            Reservation::Full => return JoinOutcome::Full,
            Reservation::Closed => return JoinOutcome::NotFound,
        }

        // Enter goes out before the route changes: once the participant can
        // address the room, its Enter is already queued ahead of anything
        // it sends.
        if !slot.handle.enter(participant.clone()) {
            slot.handle.occupancy().release();
            return JoinOutcome::NotFound;
        }
        if participant.rebind(Route::Room(slot.handle.clone())) {
            JoinOutcome::Entered
        } else {
            JoinOutcome::Departed
        }
    }

    fn find(&self, room_id: RoomId) -> Option<&RoomSlot> {
        self.rooms.iter().find(|slot| slot.handle.room_id() == room_id)
    }

    fn room_entries(&self) -> Vec<RoomEntry> {
        self.rooms.iter().map(RoomSlot::entry).collect()
    }

    fn broadcast_room_list(&self) {
        let push = Push::RoomList {
            rooms: self.room_entries(),
        };
        for participant in self.lobby.values() {
            participant.push(push.clone());
        }
    }
}

/// Spawns the registry actor and returns a handle to it.
///
/// The registry stops once every handle has been dropped, including the
/// ones held by lobby participants' routes.
pub fn spawn_registry(config: RoomConfig) -> RegistryHandle {
    let (commands_tx, commands_rx) = mpsc::channel(config.mailbox_size.max(1));
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();

    let handle = RegistryHandle {
        commands: commands_tx,
    };

    let actor = RegistryActor {
        config,
        commands_tx: handle.commands.downgrade(),
        link: RegistryLink {
            notices: notices_tx,
        },
        rooms: Vec::new(),
        lobby: BTreeMap::new(),
        next_room_id: 0,
        messages: Arc::new(Sequence::new()),
        commands: commands_rx,
        notices: notices_rx,
    };

    tokio::spawn(actor.run());
    handle
}
