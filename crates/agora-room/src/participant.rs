//! Participants and their routes.
//!
//! A [`Participant`] is a cheap, clonable handle to one connected user. The
//! connection handler owns the "real" one; the registry's lobby or a room's
//! member map hold clones. Clones are compared by [`ParticipantId`], never by
//! pointer.
//!
//! Two pieces of a participant change over its lifetime and are read from
//! several tasks: its display name and its [`Route`]. Both sit in
//! `tokio::sync::watch` cells, so readers always see the latest value and
//! the connection can *wait* for the route to become [`Route::Gone`].

use std::net::SocketAddr;
use std::sync::Arc;

use agora_protocol::{ParticipantId, Push, UserEntry};
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;

use crate::{RegistryHandle, RoomHandle};

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Where a participant currently "is": the destination of its leave and of
/// its room-scoped requests.
///
/// ```text
/// Detached → Lobby ⇄ Room
///     \        |      /
///      `-----> Gone <'
/// ```
///
/// Rebinding is done by the actor that moves the participant (registry on
/// connect/join, room on enter). `Gone` is terminal.
#[derive(Debug, Clone)]
pub enum Route {
    /// Handshake done, not yet registered.
    Detached,
    /// In the registry's lobby.
    Lobby(RegistryHandle),
    /// A member of (or entering) a room.
    Room(RoomHandle),
    /// The connection is tearing down.
    Gone,
}

impl Route {
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone)
    }

    /// Tells this route's owner that `participant` is leaving it.
    ///
    /// Errors only mean the owner already shut down, in which case there is
    /// nothing left to leave.
    pub async fn leave(&self, participant: &Participant) {
        let id = participant.id();
        let result = match self {
            Self::Lobby(registry) => registry.disconnect(id).await,
            Self::Room(room) => room.leave(id),
            Self::Detached | Self::Gone => Ok(()),
        };
        if let Err(e) = result {
            tracing::debug!(participant_id = %id, error = %e, "leave not delivered");
        }
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

struct Inner {
    id: ParticipantId,
    addr: SocketAddr,
    name: watch::Sender<String>,
    route: watch::Sender<Route>,
    outbound: mpsc::Sender<Push>,
}

/// A connected user, as seen by the registry and rooms.
#[derive(Clone)]
pub struct Participant {
    inner: Arc<Inner>,
}

impl Participant {
    /// Creates a participant whose pushes go into `outbound`.
    ///
    /// The name starts empty and the route starts [`Route::Detached`].
    pub fn new(
        id: ParticipantId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Push>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                addr,
                name: watch::Sender::new(String::new()),
                route: watch::Sender::new(Route::Detached),
                outbound,
            }),
        }
    }

    /// Creates a participant together with the receiving end of a fresh
    /// outbound queue of `capacity` pushes.
    pub fn channel(
        id: ParticipantId,
        addr: SocketAddr,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Push>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(id, addr, tx), rx)
    }

    pub fn id(&self) -> ParticipantId {
        self.inner.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// The current display name (empty until set).
    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    /// Sets or overwrites the display name.
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.name.send_replace(name.into());
    }

    /// This participant as a `userList` row.
    pub fn entry(&self) -> UserEntry {
        UserEntry {
            id: self.inner.id,
            name: self.name(),
        }
    }

    /// Queues a push for the connection's outbound loop.
    ///
    /// Never waits: a full queue drops the push, a closed queue means the
    /// connection is already gone.
    pub fn push(&self, push: Push) {
        match self.inner.outbound.try_send(push) {
            Ok(()) => {}
            Err(TrySendError::Full(push)) => {
                tracing::warn!(
                    participant_id = %self.inner.id,
                    kind = push.tag(),
                    "outbound queue full, dropping push"
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// A snapshot of the current route.
    pub fn route(&self) -> Route {
        self.inner.route.borrow().clone()
    }

    /// Points the participant at a new route.
    ///
    /// Returns `false`, leaving the route untouched, if the participant has
    /// already departed.
    pub fn rebind(&self, route: Route) -> bool {
        self.inner.route.send_if_modified(move |current| {
            if current.is_gone() {
                false
            } else {
                *current = route;
                true
            }
        })
    }

    /// Marks the participant as gone.
    ///
    /// Returns the route it was on, or `None` if it had already departed.
    /// Exactly one caller ever gets `Some`.
    pub fn depart(&self) -> Option<Route> {
        match self.inner.route.send_replace(Route::Gone) {
            Route::Gone => None,
            previous => Some(previous),
        }
    }

    pub fn is_departed(&self) -> bool {
        self.inner.route.borrow().is_gone()
    }

    /// Resolves once [`depart`](Self::depart) has been called.
    pub async fn departed(&self) {
        let mut rx = self.inner.route.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(Route::is_gone).await;
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Participant {}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.addr)
            .field("name", &*self.inner.name.borrow())
            .finish()
    }
}
