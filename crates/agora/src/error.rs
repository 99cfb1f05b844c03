//! Unified error type for Agora.

use agora_protocol::ProtocolError;
use agora_room::RoomError;
use agora_transport::TransportError;

use crate::admin::CommandError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum AgoraError {
    /// A transport-level error (bind, handshake, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed envelope or body).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The registry or a room could not be reached.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// An admin console line could not be understood.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Reading the admin console failed.
    #[error("console i/o: {0}")]
    Io(#[from] std::io::Error),
}
