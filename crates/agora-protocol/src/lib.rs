//! Wire protocol for Agora.
//!
//! - **Framing** ([`split`], [`SEPARATOR`], [`tag`]): the
//!   `<tag>\r\n\r\n<body>` envelope used in both directions.
//! - **Vocabulary** ([`Request`], [`Push`]): what clients may ask and what
//!   the server may say.
//! - **Types** ([`ParticipantId`], [`RoomId`], [`MessageId`], ...): the
//!   identifiers and listing rows those messages carry.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how bodies become bytes.
//!
//! The protocol layer knows nothing about sockets, lobbies, or rooms:
//!
//! ```text
//! Transport (bytes) → Protocol (Request / Push) → Room (lobby, rooms)
//! ```

mod codec;
mod error;
mod frame;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{Push, Request, SEPARATOR, split, tag};
pub use types::{
    MessageId, NoticeKind, ParticipantId, RoomEntry, RoomId, UserEntry,
};
