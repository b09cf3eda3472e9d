use std::io;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use crate::errors::CommandChannelError;
use crate::models::{Command, CommandKind, CommandPayload};

/// Inbox for remote commands, decoupled from the delivery transport (file,
/// subscribed topic, socket). `poll` is non-blocking and surfaces at most one
/// new command per call; a command already seen by this instance is never
/// re-surfaced.
#[async_trait]
pub trait CommandChannel: Send {
    async fn poll(&mut self) -> Result<Option<Command>, CommandChannelError>;
}

/// Command channel backed by a JSON file the viewer side rewrites for each
/// command. The file modification time is the dedupe marker: only a newer
/// mtime yields a new command.
pub struct FileCommandChannel {
    path: PathBuf,
    last_marker: Option<u64>,
}

impl FileCommandChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_marker: None,
        }
    }
}

#[async_trait]
impl CommandChannel for FileCommandChannel {
    async fn poll(&mut self) -> Result<Option<Command>, CommandChannelError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            // The viewer may not have written anything yet.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CommandChannelError::Io(e)),
        };

        let modified = metadata.modified().map_err(CommandChannelError::Io)?;
        let marker = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        if let Some(last) = self.last_marker {
            if marker <= last {
                return Ok(None);
            }
        }

        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            // Deleted between stat and read; nothing to surface.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            // Read failures must not consume the marker: the command was
            // never delivered, and the next poll has to retry it.
            Err(e) => return Err(CommandChannelError::Io(e)),
        };

        // The payload is in hand; consume the marker now so a malformed
        // payload is reported once, not on every poll.
        self.last_marker = Some(marker);

        let payload: CommandPayload = serde_json::from_slice(&raw)?;

        tracing::debug!(command = %payload.command, marker, "command received");

        Ok(Some(Command::new(
            CommandKind::from(payload.command.as_str()),
            marker,
        )))
    }
}
