//! Line-oriented operator console.
//!
//! Reads commands from any async line source (stdin in the server binary):
//!
//! ```text
//! createRoom <title...> <total>   create a room with no maker
//! rooms                           log the current room list
//! ```
//!
//! Blank lines are ignored. Lines that fail to parse are logged and skipped;
//! only losing the registry or the input stream stops the console.

use std::str::FromStr;

use agora_room::RegistryHandle;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::AgoraError;

/// Errors from parsing a console line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The line is blank.
    #[error("empty command")]
    Empty,

    /// The first word is not a known command.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// A required argument is absent.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// The capacity is not a non-negative integer.
    #[error("invalid total: {0:?}")]
    InvalidTotal(String),
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Create a room without a maker. The last word is the capacity; all
    /// words before it form the title.
    CreateRoom { title: String, total: u32 },
    /// Log every live room.
    Rooms,
}

impl FromStr for AdminCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(CommandError::Empty)?;
        match command {
            "createRoom" => {
                let args: Vec<&str> = words.collect();
                let Some((total, title)) = args.split_last() else {
                    return Err(CommandError::MissingArgument("title"));
                };
                if title.is_empty() {
                    return Err(CommandError::MissingArgument("total"));
                }
                let total = total
                    .parse()
                    .map_err(|_| CommandError::InvalidTotal((*total).to_string()))?;
                Ok(Self::CreateRoom {
                    title: title.join(" "),
                    total,
                })
            }
            "rooms" => Ok(Self::Rooms),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Runs the console until `reader` reaches end of input.
///
/// # Errors
/// Returns an error if reading fails or the registry has shut down.
pub async fn run_admin<R>(reader: R, registry: RegistryHandle) -> Result<(), AgoraError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match run_command(&line, &registry).await {
            Ok(()) | Err(AgoraError::Command(CommandError::Empty)) => {}
            Err(AgoraError::Command(e)) => {
                tracing::warn!(error = %e, %line, "console: ignoring line");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::debug!("console input closed");
    Ok(())
}

/// Parses and executes a single console line.
///
/// # Errors
/// [`AgoraError::Command`] if the line does not parse, or a room error if
/// the registry has shut down.
pub async fn run_command(line: &str, registry: &RegistryHandle) -> Result<(), AgoraError> {
    let command: AdminCommand = line.parse()?;
    execute(command, registry).await
}

async fn execute(command: AdminCommand, registry: &RegistryHandle) -> Result<(), AgoraError> {
    match command {
        AdminCommand::CreateRoom { title, total } => {
            let room_id = registry.create_room(None, title.as_str(), total).await?;
            tracing::info!(%room_id, %title, total, "console: room created");
        }
        AdminCommand::Rooms => {
            let snapshot = registry.snapshot().await?;
            for room in &snapshot.rooms {
                tracing::info!(
                    room_id = %room.id,
                    title = %room.title,
                    current = room.current,
                    total = room.total,
                    maker = ?room.maker,
                    "console: room"
                );
            }
            tracing::info!(
                rooms = snapshot.rooms.len(),
                lobby = snapshot.lobby.len(),
                "console: registry"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use agora_room::{RoomConfig, spawn_registry};

    use super::*;

    #[test]
    fn test_parse_create_room() {
        let cmd: AdminCommand = "createRoom lobby 8".parse().unwrap();
        assert_eq!(
            cmd,
            AdminCommand::CreateRoom {
                title: "lobby".into(),
                total: 8
            }
        );
    }

    #[test]
    fn test_parse_create_room_multi_word_title() {
        let cmd: AdminCommand = "  createRoom  Rust   study group 4 ".parse().unwrap();
        assert_eq!(
            cmd,
            AdminCommand::CreateRoom {
                title: "Rust study group".into(),
                total: 4
            }
        );
    }

    #[test]
    fn test_parse_rooms() {
        assert_eq!("rooms".parse::<AdminCommand>().unwrap(), AdminCommand::Rooms);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<AdminCommand>(), Err(CommandError::Empty));
        assert_eq!(
            "reboot now".parse::<AdminCommand>(),
            Err(CommandError::Unknown("reboot".into()))
        );
        assert_eq!(
            "createRoom".parse::<AdminCommand>(),
            Err(CommandError::MissingArgument("title"))
        );
        assert_eq!(
            "createRoom 5".parse::<AdminCommand>(),
            Err(CommandError::MissingArgument("total"))
        );
        assert_eq!(
            "createRoom lobby many".parse::<AdminCommand>(),
            Err(CommandError::InvalidTotal("many".into()))
        );
        assert_eq!(
            "createRoom lobby -3".parse::<AdminCommand>(),
            Err(CommandError::InvalidTotal("-3".into()))
        );
    }

    #[tokio::test]
    async fn test_run_command_reports_parse_errors() {
        let registry = spawn_registry(RoomConfig::default());

        let err = run_command("createRoom lobby", &registry).await.unwrap_err();
        assert!(matches!(
            err,
            AgoraError::Command(CommandError::MissingArgument("total"))
        ));

        run_command("createRoom lobby 3", &registry).await.unwrap();
        assert_eq!(registry.snapshot().await.unwrap().rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_run_admin_creates_rooms_and_skips_bad_lines() {
        let registry = spawn_registry(RoomConfig::default());
        let input: &[u8] =
            b"createRoom General 2\n\nnonsense\ncreateRoom Big Room 99\nrooms\n";

        run_admin(input, registry.clone()).await.unwrap();

        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.rooms.len(), 2);
        assert_eq!(snapshot.rooms[0].title, "General");
        assert_eq!(snapshot.rooms[0].maker, None);
        assert_eq!(snapshot.rooms[1].title, "Big Room");
        assert_eq!(snapshot.rooms[1].total, 16);
    }
}
