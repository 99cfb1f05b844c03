//! Room actor: one Tokio task per live chat room.
//!
//! The actor exclusively owns the room's member map. Everyone else talks to
//! it through a [`RoomHandle`]. Membership changes (`Enter`, `Leave`) travel
//! on one unbounded FIFO control channel, so the registry never waits on a
//! room and a participant's leave and its next entry are seen in the order
//! they happened. Everything else (`Broadcast`, `Info`) goes over a bounded
//! command mailbox.
//!
//! The loop polls, in priority order:
//!
//! 1. control (`Enter`, `Leave`), so a participant's entry is always
//!    processed before anything that participant sends afterwards;
//! 2. commands (`Broadcast`, `Info`);
//! 3. the idle timer, which closes the room once it is empty.

use std::collections::BTreeMap;
use std::sync::Arc;

use agora_protocol::{
    MessageId, NoticeKind, ParticipantId, Push, RoomId, UserEntry,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::registry::RegistryLink;
use crate::{Occupancy, Participant, RoomConfig, RoomError, RoomState, Route, Sequence};

/// Something to deliver inside a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A chat line for every member.
    Chat {
        sender: ParticipantId,
        name: String,
        content: String,
    },
    /// A system announcement for every member.
    Notice { kind: NoticeKind, content: String },
    /// A private line from `from` to `to`.
    Whisper {
        from: ParticipantId,
        to: ParticipantId,
        name: String,
        content: String,
    },
    /// `actor` asks to ban `target`. Honored only for the room maker.
    Ban {
        actor: ParticipantId,
        target: ParticipantId,
    },
}

pub(crate) enum RoomControl {
    Enter(Participant),
    Leave(ParticipantId),
}

pub(crate) enum RoomCommand {
    Broadcast(RoomEvent),
    Info { reply: oneshot::Sender<RoomInfo> },
}

/// A snapshot of one room.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub title: String,
    pub state: RoomState,
    pub total: u32,
    pub current: u32,
    /// Members in id order.
    pub members: Vec<UserEntry>,
    pub maker: Option<ParticipantId>,
}

/// Handle to a running room actor.
///
/// Cheap to clone. Carries the room's [`Occupancy`] so the registry can
/// list and arbitrate without asking the actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    commands: mpsc::Sender<RoomCommand>,
    control: mpsc::UnboundedSender<RoomControl>,
    occupancy: Arc<Occupancy>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    /// Removes a member. Unknown ids are ignored by the room.
    ///
    /// Never waits. Queued behind any earlier `Enter`, and ahead of any
    /// `Enter` the registry sends after this returns.
    pub fn leave(&self, participant_id: ParticipantId) -> Result<(), RoomError> {
        self.control
            .send(RoomControl::Leave(participant_id))
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Delivers an event to the room's members (fire-and-forget).
    pub async fn broadcast(&self, event: RoomEvent) -> Result<(), RoomError> {
        self.send(RoomCommand::Broadcast(event)).await
    }

    /// Requests a snapshot of the room.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Info { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Hands a participant holding a reservation to the room.
    ///
    /// Returns `false` if the room actor has already exited.
    pub(crate) fn enter(&self, participant: Participant) -> bool {
        self.control.send(RoomControl::Enter(participant)).is_ok()
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// Everything a new room needs besides the registry plumbing.
pub(crate) struct NewRoom {
    pub room_id: RoomId,
    pub title: String,
    pub total: u32,
    pub maker: Option<ParticipantId>,
}

struct RoomActor {
    handle: RoomHandle,
    title: String,
    maker: Option<ParticipantId>,
    state: RoomState,
    config: RoomConfig,
    members: BTreeMap<ParticipantId, Participant>,
    messages: Arc<Sequence>,
    registry: RegistryLink,
    commands: mpsc::Receiver<RoomCommand>,
    control: mpsc::UnboundedReceiver<RoomControl>,
}

impl RoomActor {
    fn room_id(&self) -> RoomId {
        self.handle.room_id
    }

    async fn run(mut self) {
        let room_id = self.room_id();
        tracing::info!(%room_id, title = %self.title, total = self.handle.occupancy.total(), "room opened");

        let period = self.config.idle_timeout;
        let mut idle = tokio::time::interval_at(Instant::now() + period, period);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                Some(control) = self.control.recv() => match control {
                    RoomControl::Enter(participant) => self.handle_enter(participant),
                    RoomControl::Leave(id) => self.handle_leave(id),
                },
                Some(cmd) = self.commands.recv() => match cmd {
                    RoomCommand::Broadcast(event) => self.handle_event(event),
                    RoomCommand::Info { reply } => {
                        let _ = reply.send(self.info());
                    }
                },
                _ = idle.tick() => {
                    if self.try_close() {
                        break;
                    }
                }
            }
        }

        tracing::info!(%room_id, "room closed");
    }

    fn handle_enter(&mut self, participant: Participant) {
        let room_id = self.room_id();
        let participant_id = participant.id();

        if self.members.contains_key(&participant_id) {
            // Already a member, so the route is right; only the slot is spare.
            tracing::debug!(%room_id, %participant_id, "duplicate enter");
            self.handle.occupancy.release();
            participant.push(Push::join_accepted(room_id));
            return;
        }
        if !participant.rebind(Route::Room(self.handle.clone())) {
            tracing::debug!(%room_id, %participant_id, "enter from departed participant ignored");
            self.handle.occupancy.release();
            return;
        }

        let name = participant.name();
        self.members.insert(participant_id, participant.clone());
        participant.push(Push::join_accepted(room_id));
        self.handle.occupancy.admit();
        tracing::info!(
            %room_id,
            %participant_id,
            current = self.handle.occupancy.current(),
            "participant entered"
        );

        self.notice(NoticeKind::Enter, format!("{name} has entered."));
        self.broadcast_user_list();
        self.registry.room_changed(room_id);
    }

    fn handle_leave(&mut self, participant_id: ParticipantId) {
        let room_id = self.room_id();
        let Some(participant) = self.members.remove(&participant_id) else {
            return;
        };
        self.handle.occupancy.vacate();
        tracing::info!(
            %room_id,
            %participant_id,
            current = self.handle.occupancy.current(),
            "participant left"
        );

        self.notice(
            NoticeKind::Leave,
            format!("{} has left.", participant.name()),
        );
        self.broadcast_user_list();
        self.registry.room_changed(room_id);
    }

    fn handle_event(&mut self, event: RoomEvent) {
        let room_id = self.room_id();
        match event {
            RoomEvent::Chat {
                sender,
                name,
                content,
            } => {
                if !self.members.contains_key(&sender) {
                    tracing::debug!(%room_id, %sender, "chat from non-member dropped");
                    return;
                }
                let push = Push::ChatMessage {
                    id: self.next_message_id(),
                    name,
                    content,
                };
                self.fan_out(&push);
            }
            RoomEvent::Notice { kind, content } => self.notice(kind, content),
            RoomEvent::Whisper {
                from,
                to,
                name,
                content,
            } => {
                let Some(sender) = self.members.get(&from) else {
                    tracing::debug!(%room_id, %from, "whisper from non-member dropped");
                    return;
                };
                let push = Push::Whisper {
                    id: self.next_message_id(),
                    from,
                    to,
                    name,
                    content,
                };
                // The sender always gets its own line; the addressee only
                // if it is here.
                if from != to {
                    match self.members.get(&to) {
                        Some(target) => target.push(push.clone()),
                        None => tracing::debug!(%room_id, %to, "whisper addressee not in room"),
                    }
                }
                sender.push(push);
            }
            RoomEvent::Ban { actor, target } => {
                if self.maker != Some(actor) {
                    tracing::debug!(%room_id, %actor, "ban from non-maker dropped");
                    return;
                }
                match self.members.get(&target) {
                    Some(member) => {
                        tracing::info!(%room_id, %actor, %target, "ban delivered");
                        member.push(Push::BanUser { id: actor, target });
                    }
                    None => {
                        tracing::debug!(%room_id, %target, "ban target not in room");
                    }
                }
            }
        }
    }

    fn notice(&self, kind: NoticeKind, content: String) {
        let push = Push::Notice {
            id: self.next_message_id(),
            kind,
            content,
        };
        self.fan_out(&push);
    }

    fn broadcast_user_list(&self) {
        let users = self.members.values().map(Participant::entry).collect();
        self.fan_out(&Push::UserList { users });
    }

    fn fan_out(&self, push: &Push) {
        for member in self.members.values() {
            member.push(push.clone());
        }
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(self.messages.next())
    }

    /// Closes the room if it is empty. Returns `true` if it did.
    fn try_close(&mut self) -> bool {
        if !self.handle.occupancy.try_close() {
            return false;
        }
        let room_id = self.room_id();
        self.transition(RoomState::Closing);
        self.registry.room_closed(room_id);
        self.transition(RoomState::Closed);
        true
    }

    fn transition(&mut self, target: RoomState) {
        debug_assert!(self.state.can_transition_to(target));
        tracing::debug!(room_id = %self.room_id(), from = %self.state, to = %target, "room state");
        self.state = target;
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id(),
            title: self.title.clone(),
            state: self.state,
            total: self.handle.occupancy.total(),
            current: self.handle.occupancy.current(),
            members: self.members.values().map(Participant::entry).collect(),
            maker: self.maker,
        }
    }
}

/// Spawns a room actor and returns a handle to it.
pub(crate) fn spawn_room(
    new_room: NewRoom,
    config: RoomConfig,
    messages: Arc<Sequence>,
    registry: RegistryLink,
) -> RoomHandle {
    let (commands_tx, commands_rx) = mpsc::channel(config.mailbox_size.max(1));
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let handle = RoomHandle {
        room_id: new_room.room_id,
        commands: commands_tx,
        control: control_tx,
        occupancy: Arc::new(Occupancy::new(new_room.total)),
    };

    let actor = RoomActor {
        handle: handle.clone(),
        title: new_room.title,
        maker: new_room.maker,
        state: RoomState::Active,
        config,
        members: BTreeMap::new(),
        messages,
        registry,
        commands: commands_rx,
        control: control_rx,
    };

    tokio::spawn(actor.run());
    handle
}
