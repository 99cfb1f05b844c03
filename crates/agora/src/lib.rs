//! # Agora
//!
//! A real-time, multi-room chat server over WebSockets.
//!
//! Clients connect, pick a display name, and land in a **lobby** where they
//! see the list of live rooms. From there they create or join rooms of
//! bounded capacity, chat, whisper, and (as a room's maker) ban members.
//! Empty rooms reclaim themselves.
//!
//! This crate wires the layers together:
//!
//! ```text
//! agora-transport (WebSocket) → agora-protocol (envelopes) → agora-room (actors)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agora::prelude::*;
//!
//! # async fn run() -> Result<(), AgoraError> {
//! let server = AgoraServer::builder()
//!     .bind("0.0.0.0:8000")
//!     .build()
//!     .await?;
//!
//! // Optional operator console.
//! let registry = server.registry();
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! tokio::spawn(run_admin(stdin, registry));
//!
//! server.run().await
//! # }
//! ```

mod admin;
mod error;
mod handler;
mod server;

pub use admin::{AdminCommand, CommandError, run_admin, run_command};
pub use error::AgoraError;
pub use server::{AgoraServer, AgoraServerBuilder, ServerConfig};

pub use agora_protocol as protocol;
pub use agora_room as room;
pub use agora_transport as transport;

/// Everything needed to embed and run a server.
pub mod prelude {
    pub use crate::{
        AdminCommand, AgoraError, AgoraServer, AgoraServerBuilder,
        ServerConfig, run_admin,
    };
    pub use agora_protocol::{ParticipantId, RoomId};
    pub use agora_room::{RegistryHandle, RoomConfig};
}
