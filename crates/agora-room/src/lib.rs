//! Lobby and chat room coordination for Agora.
//!
//! Two kinds of actor live here, each an isolated Tokio task that owns its
//! state and is reached only through a handle:
//!
//! - the **registry** ([`spawn_registry`], [`RegistryHandle`]): the lobby,
//!   the ordered room list, room creation and join arbitration;
//! - one **room** per live chat room ([`RoomHandle`]): membership, fan-out,
//!   whispers, bans, and idle reclamation.
//!
//! The little state that is shared across tasks is explicitly synchronized:
//! [`Occupancy`] counters behind a lock, [`Sequence`] atomics for ids, and
//! each [`Participant`]'s name and [`Route`] in watch cells.
//!
//! # Key types
//!
//! - [`Participant`]: a connected user and its outbound queue
//! - [`Route`]: where a participant's leave and room requests go
//! - [`RoomEvent`]: what a connection asks a room to deliver
//! - [`JoinOutcome`]: how the registry settled a join
//! - [`RoomConfig`] / [`RoomState`]: settings and room lifecycle

mod config;
mod error;
mod occupancy;
mod participant;
mod registry;
mod room;
mod sequence;

pub use config::{RoomConfig, RoomState};
pub use error::RoomError;
pub use occupancy::{Occupancy, Reservation};
pub use participant::{Participant, Route};
pub use registry::{JoinOutcome, RegistryHandle, RegistrySnapshot, spawn_registry};
pub use room::{RoomEvent, RoomHandle, RoomInfo};
pub use sequence::Sequence;
