//! Error types for the room layer.
//!
//! Room and registry operations themselves never fail; capacity and
//! membership problems are answered on the wire. What can fail is reaching
//! an actor whose mailbox has closed, which only happens on shutdown or
//! after a room reclaimed itself.

use agora_protocol::RoomId;

/// Errors that can occur when talking to a room or the registry.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room's mailbox is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The registry's mailbox is closed.
    #[error("registry is unavailable")]
    RegistryUnavailable,
}
