//! Room configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by the registry and every room it spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Upper bound for a room's capacity. Larger requests are clamped.
    pub max_capacity: u32,

    /// How often an empty room checks whether it should close itself.
    pub idle_timeout: Duration,

    /// Size of the bounded command mailboxes (registry and rooms). Zero is
    /// treated as one.
    pub mailbox_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_capacity: 16,
            idle_timeout: Duration::from_secs(10),
            mailbox_size: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Active → Closing → Closed
/// ```
///
/// - **Active**: accepting reservations, members chat.
/// - **Closing**: the idle check found the room empty; the registry is
///   being told to drop it.
/// - **Closed**: the actor loop has exited. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Active,
    Closing,
    Closed,
}

impl RoomState {
    /// Returns `true` while the room is serving members.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// The only state reachable from this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Active => Some(Self::Closing),
            Self::Closing => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
