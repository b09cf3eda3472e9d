use serde::Deserialize;
use time::OffsetDateTime;

/// Wire format of an inbound command: a JSON object with at least a
/// `command` field. Extra fields are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct CommandPayload {
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandKind {
    OpenDoor,
    /// Unrecognized command names are carried through so the controller can
    /// log and ignore them instead of failing the channel.
    Unknown(String),
}

impl From<&str> for CommandKind {
    fn from(raw: &str) -> Self {
        match raw {
            "OPEN_DOOR" => Self::OpenDoor,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A command delivered by a [`CommandChannel`]. The marker is a monotonically
/// increasing dedupe key (file mtime, sequence number) assigned by the
/// channel backend; redeliveries carry the same marker.
///
/// [`CommandChannel`]: crate::services::CommandChannel
#[derive(Clone, Debug)]
pub struct Command {
    pub kind: CommandKind,
    pub marker: u64,
    pub issued_at: OffsetDateTime,
}

impl Command {
    pub fn new(kind: CommandKind, marker: u64) -> Self {
        Self {
            kind,
            marker,
            issued_at: OffsetDateTime::now_utc(),
        }
    }
}
