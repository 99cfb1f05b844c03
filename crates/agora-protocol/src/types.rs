//! Identifiers and listing entries shared by requests and pushes.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected participant.
///
/// Newtype over `u64` so a `ParticipantId` can never be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps it a bare number on
/// the wire: `ParticipantId(4)` is just `4`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a chat room.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Stamp carried by chat, whisper, and notice pushes.
///
/// Drawn from one sequence shared by every room, so ids increase across
/// the whole server, not just within a room.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Notice kinds
// ---------------------------------------------------------------------------

/// What a `notice` push announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    /// Someone entered the room.
    Enter,
    /// Someone left the room.
    Leave,
}

// ---------------------------------------------------------------------------
// Listing entries
// ---------------------------------------------------------------------------

/// One row of a room's `userList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: ParticipantId,
    pub name: String,
}

/// One row of the lobby's `roomList`.
///
/// `maker` is `None` for rooms created from the admin console; it still
/// appears on the wire as `"roomMaker": null` so clients see a stable shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
    pub id: RoomId,
    pub title: String,
    pub total: u32,
    pub current: u32,
    #[serde(rename = "roomMaker")]
    pub maker: Option<ParticipantId>,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_participant_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ParticipantId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_room_id_deserializes_from_plain_number() {
        let id: RoomId = serde_json::from_str("7").unwrap();
        assert_eq!(id, RoomId(7));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ParticipantId(7).to_string(), "P-7");
        assert_eq!(RoomId(3).to_string(), "R-3");
        assert_eq!(MessageId(0).to_string(), "M-0");
    }

    #[test]
    fn test_ids_order_numerically() {
        assert!(MessageId(2) < MessageId(10));
        assert!(ParticipantId(0) < ParticipantId(1));
    }

    // =====================================================================
    // NoticeKind
    // =====================================================================

    #[test]
    fn test_notice_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NoticeKind::Enter).unwrap(),
            "\"enter\""
        );
        assert_eq!(
            serde_json::to_string(&NoticeKind::Leave).unwrap(),
            "\"leave\""
        );
    }

    // =====================================================================
    // Listing entries
    // =====================================================================

    #[test]
    fn test_room_entry_json_format() {
        let entry = RoomEntry {
            id: RoomId(0),
            title: "General".into(),
            total: 2,
            current: 1,
            maker: Some(ParticipantId(5)),
        };
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["id"], 0);
        assert_eq!(json["title"], "General");
        assert_eq!(json["total"], 2);
        assert_eq!(json["current"], 1);
        assert_eq!(json["roomMaker"], 5);
    }

    #[test]
    fn test_room_entry_without_maker_is_null() {
        let entry = RoomEntry {
            id: RoomId(1),
            title: "lounge".into(),
            total: 16,
            current: 0,
            maker: None,
        };
        let json = serde_json::to_value(&entry).unwrap();

        assert!(json["roomMaker"].is_null());
        assert!(json.as_object().unwrap().contains_key("roomMaker"));
    }
}
