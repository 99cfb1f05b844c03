//! Envelope framing and the request/push vocabulary.
//!
//! Every message on the wire, in either direction, is
//!
//! ```text
//! <tag>\r\n\r\n<body>
//! ```
//!
//! where `<tag>` names the message kind and `<body>` is the codec-encoded
//! payload. Kinds without a body (`leaveRoom`) may omit the separator.
//!
//! Inbound traffic decodes into a [`Request`]; everything the server sends
//! is a [`Push`]. Both are closed enums, so every dispatch site is an
//! exhaustive `match`.

use serde::{Deserialize, Serialize};

use crate::{
    Codec, MessageId, NoticeKind, ParticipantId, ProtocolError, RoomEntry,
    RoomId, UserEntry,
};

/// Separates the tag from the body.
pub const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Message tags, shared by requests and pushes of the same kind.
pub mod tag {
    pub const SET_NAME: &str = "setName";
    pub const CREATE_ROOM: &str = "createRoom";
    pub const JOIN_ROOM: &str = "joinRoom";
    pub const LEAVE_ROOM: &str = "leaveRoom";
    pub const CHAT_MESSAGE: &str = "chatMessage";
    pub const WHISPER_MESSAGE: &str = "whisperMessage";
    pub const NOTICE: &str = "notice";
    pub const USER_LIST: &str = "userList";
    pub const ROOM_LIST: &str = "roomList";
    pub const BAN_USER: &str = "banUser";
}

/// Splits a raw envelope into its tag and body.
///
/// Surrounding whitespace is trimmed first, then the envelope is cut at the
/// first separator. Without a separator the body is empty.
///
/// # Errors
/// Returns `ProtocolError::InvalidMessage` if the tag is not UTF-8.
pub fn split(data: &[u8]) -> Result<(&str, &[u8]), ProtocolError> {
    let data = data.trim_ascii();
    let (head, body) = match data
        .windows(SEPARATOR.len())
        .position(|w| w == SEPARATOR)
    {
        Some(at) => (&data[..at], &data[at + SEPARATOR.len()..]),
        None => (data, &data[data.len()..]),
    };
    let tag = std::str::from_utf8(head).map_err(|_| {
        ProtocolError::InvalidMessage("tag is not valid UTF-8".into())
    })?;
    Ok((tag, body))
}

// ---------------------------------------------------------------------------
// Request: client → server
// ---------------------------------------------------------------------------

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Set or overwrite the display name.
    SetName { name: String },
    /// Create a room; `total` is clamped by the registry.
    CreateRoom { title: String, total: u32 },
    /// Move from the lobby into a room.
    JoinRoom { id: RoomId },
    /// Say something to everyone in the current room.
    ChatMessage { content: String },
    /// Say something to one member of the current room.
    Whisper { to: ParticipantId, content: String },
    /// Go back to the lobby.
    LeaveRoom,
    /// Ask the room to eject a member. Only honored for the room maker.
    BanUser { ban_id: ParticipantId },
}

#[derive(Deserialize)]
struct SetNameBody {
    name: String,
}

#[derive(Deserialize)]
struct CreateRoomBody {
    title: String,
    total: u32,
}

#[derive(Deserialize)]
struct JoinRoomBody {
    id: RoomId,
}

#[derive(Deserialize)]
struct ChatBody {
    content: String,
}

#[derive(Deserialize)]
struct WhisperBody {
    to: ParticipantId,
    content: String,
}

#[derive(Deserialize)]
struct BanBody {
    #[serde(rename = "banID")]
    ban_id: ParticipantId,
}

impl Request {
    /// Decodes one raw inbound envelope.
    ///
    /// # Errors
    /// - `UnknownType` for a tag the server does not handle (including
    ///   server-only tags like `roomList`).
    /// - `Decode` when the body does not fit the tag.
    /// - `InvalidMessage` when the envelope cannot be split.
    pub fn decode<C: Codec>(codec: &C, data: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, body) = split(data)?;
        let request = match kind {
            tag::SET_NAME => {
                let SetNameBody { name } = codec.decode(body)?;
                Self::SetName { name }
            }
            tag::CREATE_ROOM => {
                let CreateRoomBody { title, total } = codec.decode(body)?;
                Self::CreateRoom { title, total }
            }
            tag::JOIN_ROOM => {
                let JoinRoomBody { id } = codec.decode(body)?;
                Self::JoinRoom { id }
            }
            tag::CHAT_MESSAGE => {
                let ChatBody { content } = codec.decode(body)?;
                Self::ChatMessage { content }
            }
            tag::WHISPER_MESSAGE => {
                let WhisperBody { to, content } = codec.decode(body)?;
                Self::Whisper { to, content }
            }
            // Any body (older clients send the room id) is ignored.
            tag::LEAVE_ROOM => Self::LeaveRoom,
            tag::BAN_USER => {
                let BanBody { ban_id } = codec.decode(body)?;
                Self::BanUser { ban_id }
            }
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(request)
    }

    /// The wire tag this request arrived under.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SetName { .. } => tag::SET_NAME,
            Self::CreateRoom { .. } => tag::CREATE_ROOM,
            Self::JoinRoom { .. } => tag::JOIN_ROOM,
            Self::ChatMessage { .. } => tag::CHAT_MESSAGE,
            Self::Whisper { .. } => tag::WHISPER_MESSAGE,
            Self::LeaveRoom => tag::LEAVE_ROOM,
            Self::BanUser { .. } => tag::BAN_USER,
        }
    }
}

// ---------------------------------------------------------------------------
// Push: server → client
// ---------------------------------------------------------------------------

/// A message the server sends to one participant.
///
/// Serialized `untagged`: the body is just the variant's fields, and the
/// kind travels in the envelope tag (see [`Push::tag`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Push {
    /// Acknowledges `setName`.
    SetName { ok: bool },

    /// Outcome of `joinRoom`. `id` is `-1` when the join was refused.
    JoinRoom { id: i64, ok: bool },

    /// A chat line, stamped by the room.
    ChatMessage {
        id: MessageId,
        name: String,
        content: String,
    },

    /// A private line; delivered to sender and addressee only.
    Whisper {
        id: MessageId,
        from: ParticipantId,
        to: ParticipantId,
        name: String,
        content: String,
    },

    /// A room-wide announcement such as "ann has entered.".
    Notice {
        id: MessageId,
        #[serde(rename = "noticeType")]
        kind: NoticeKind,
        content: String,
    },

    /// The full membership of the current room.
    UserList {
        #[serde(rename = "userList")]
        users: Vec<UserEntry>,
    },

    /// Every live room, in creation order. Sent to the lobby.
    RoomList { rooms: Vec<RoomEntry> },

    /// Tells `target` it has been banned by `id`.
    BanUser {
        id: ParticipantId,
        #[serde(rename = "banID")]
        target: ParticipantId,
    },
}

impl Push {
    /// A successful `joinRoom` reply.
    pub fn join_accepted(room_id: RoomId) -> Self {
        // Room ids are assigned sequentially and stay far below i64::MAX.
        Self::JoinRoom {
            id: i64::try_from(room_id.0).unwrap_or(i64::MAX),
            ok: true,
        }
    }

    /// A refused `joinRoom` reply.
    pub fn join_rejected() -> Self {
        Self::JoinRoom { id: -1, ok: false }
    }

    /// The envelope tag for this push.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SetName { .. } => tag::SET_NAME,
            Self::JoinRoom { .. } => tag::JOIN_ROOM,
            Self::ChatMessage { .. } => tag::CHAT_MESSAGE,
            Self::Whisper { .. } => tag::WHISPER_MESSAGE,
            Self::Notice { .. } => tag::NOTICE,
            Self::UserList { .. } => tag::USER_LIST,
            Self::RoomList { .. } => tag::ROOM_LIST,
            Self::BanUser { .. } => tag::BAN_USER,
        }
    }

    /// Encodes this push into a complete envelope.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the body cannot be serialized.
    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        let body = codec.encode(self)?;
        let tag = self.tag().as_bytes();
        let mut out = Vec::with_capacity(tag.len() + SEPARATOR.len() + body.len());
        out.extend_from_slice(tag);
        out.extend_from_slice(SEPARATOR);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::JsonCodec;

    fn body_json(push: &Push) -> serde_json::Value {
        let bytes = push.encode(&JsonCodec).unwrap();
        let (kind, body) = split(&bytes).unwrap();
        assert_eq!(kind, push.tag());
        serde_json::from_slice(body).unwrap()
    }

    // =====================================================================
    // split
    // =====================================================================

    #[test]
    fn test_split_cuts_at_first_separator() {
        let (kind, body) =
            split(b"chatMessage\r\n\r\n{\"content\":\"a\r\n\r\nb\"}").unwrap();
        assert_eq!(kind, "chatMessage");
        assert_eq!(body, b"{\"content\":\"a\r\n\r\nb\"}");
    }

    #[test]
    fn test_split_trims_surrounding_whitespace() {
        let (kind, body) = split(b"  \n setName\r\n\r\n{}\r\n ").unwrap();
        assert_eq!(kind, "setName");
        assert_eq!(body, b"{}");
    }

    #[test]
    fn test_split_without_separator_has_empty_body() {
        let (kind, body) = split(b"leaveRoom").unwrap();
        assert_eq!(kind, "leaveRoom");
        assert!(body.is_empty());
    }

    #[test]
    fn test_split_rejects_non_utf8_tag() {
        let result = split(&[0xff, 0xfe, b'\r', b'\n', b'\r', b'\n']);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    // =====================================================================
    // Request::decode
    // =====================================================================

    #[test]
    fn test_decode_set_name() {
        let req =
            Request::decode(&JsonCodec, b"setName\r\n\r\n{\"name\":\"ann\"}")
                .unwrap();
        assert_eq!(req, Request::SetName { name: "ann".into() });
        assert_eq!(req.tag(), "setName");
    }

    #[test]
    fn test_decode_create_room() {
        let req = Request::decode(
            &JsonCodec,
            b"createRoom\r\n\r\n{\"title\":\"General\",\"total\":2}",
        )
        .unwrap();
        assert_eq!(
            req,
            Request::CreateRoom {
                title: "General".into(),
                total: 2
            }
        );
    }

    #[test]
    fn test_decode_join_room() {
        let req =
            Request::decode(&JsonCodec, b"joinRoom\r\n\r\n{\"id\":0}").unwrap();
        assert_eq!(req, Request::JoinRoom { id: RoomId(0) });
    }

    #[test]
    fn test_decode_whisper() {
        let req = Request::decode(
            &JsonCodec,
            b"whisperMessage\r\n\r\n{\"to\":4,\"content\":\"psst\"}",
        )
        .unwrap();
        assert_eq!(
            req,
            Request::Whisper {
                to: ParticipantId(4),
                content: "psst".into()
            }
        );
    }

    #[test]
    fn test_decode_ban_uses_ban_id_field() {
        let req =
            Request::decode(&JsonCodec, b"banUser\r\n\r\n{\"banID\":2}").unwrap();
        assert_eq!(
            req,
            Request::BanUser {
                ban_id: ParticipantId(2)
            }
        );
    }

    #[test]
    fn test_decode_leave_room_with_or_without_body() {
        assert_eq!(
            Request::decode(&JsonCodec, b"leaveRoom").unwrap(),
            Request::LeaveRoom
        );
        assert_eq!(
            Request::decode(&JsonCodec, b"leaveRoom\r\n\r\n{\"id\":3}").unwrap(),
            Request::LeaveRoom
        );
    }

    #[test]
    fn test_decode_unknown_tag_is_unknown_type() {
        let err = Request::decode(&JsonCodec, b"dance\r\n\r\n{}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "dance"));
    }

    #[test]
    fn test_decode_server_only_tag_is_unknown_type() {
        let err =
            Request::decode(&JsonCodec, b"roomList\r\n\r\n{\"rooms\":[]}")
                .unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn test_decode_malformed_body_is_decode_error() {
        let err = Request::decode(&JsonCodec, b"setName\r\n\r\n{\"name\":")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_decode_missing_body_is_decode_error() {
        let err = Request::decode(&JsonCodec, b"chatMessage").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_decode_negative_total_is_decode_error() {
        let err = Request::decode(
            &JsonCodec,
            b"createRoom\r\n\r\n{\"title\":\"x\",\"total\":-1}",
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    // =====================================================================
    // Push::encode: one test per kind to pin the JSON shape
    // =====================================================================

    #[test]
    fn test_encode_set_name_envelope_bytes() {
        let bytes = Push::SetName { ok: true }.encode(&JsonCodec).unwrap();
        assert_eq!(bytes, b"setName\r\n\r\n{\"ok\":true}");
    }

    #[test]
    fn test_encode_join_accepted_and_rejected() {
        let json = body_json(&Push::join_accepted(RoomId(3)));
        assert_eq!(json, serde_json::json!({"id": 3, "ok": true}));

        let json = body_json(&Push::join_rejected());
        assert_eq!(json, serde_json::json!({"id": -1, "ok": false}));
    }

    #[test]
    fn test_encode_chat_message() {
        let json = body_json(&Push::ChatMessage {
            id: MessageId(12),
            name: "ann".into(),
            content: "hi".into(),
        });
        assert_eq!(
            json,
            serde_json::json!({"id": 12, "name": "ann", "content": "hi"})
        );
    }

    #[test]
    fn test_encode_whisper() {
        let json = body_json(&Push::Whisper {
            id: MessageId(1),
            from: ParticipantId(0),
            to: ParticipantId(1),
            name: "ann".into(),
            content: "psst".into(),
        });
        assert_eq!(json["from"], 0);
        assert_eq!(json["to"], 1);
        assert_eq!(json["name"], "ann");
    }

    #[test]
    fn test_encode_notice_uses_notice_type_field() {
        let json = body_json(&Push::Notice {
            id: MessageId(4),
            kind: NoticeKind::Enter,
            content: "bob has entered.".into(),
        });
        assert_eq!(json["noticeType"], "enter");
        assert_eq!(json["content"], "bob has entered.");
    }

    #[test]
    fn test_encode_user_list() {
        let json = body_json(&Push::UserList {
            users: vec![UserEntry {
                id: ParticipantId(0),
                name: "ann".into(),
            }],
        });
        assert_eq!(
            json,
            serde_json::json!({"userList": [{"id": 0, "name": "ann"}]})
        );
    }

    #[test]
    fn test_encode_room_list() {
        let json = body_json(&Push::RoomList {
            rooms: vec![RoomEntry {
                id: RoomId(0),
                title: "General".into(),
                total: 2,
                current: 0,
                maker: Some(ParticipantId(0)),
            }],
        });
        assert_eq!(json["rooms"][0]["title"], "General");
        assert_eq!(json["rooms"][0]["roomMaker"], 0);
    }

    #[test]
    fn test_encode_ban_user() {
        let json = body_json(&Push::BanUser {
            id: ParticipantId(0),
            target: ParticipantId(1),
        });
        assert_eq!(json, serde_json::json!({"id": 0, "banID": 1}));
    }
}
