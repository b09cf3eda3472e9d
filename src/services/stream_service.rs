use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::errors::LaunchError;

/// Tracked external stream process. The video pipeline is opaque: the handle
/// only knows the pid and whether the process is still alive.
pub struct StreamHandle {
    pid: Option<u32>,
    child: Child,
}

impl StreamHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Starts and supervises the external media-streaming process, one instance
/// per channel. Launch is fire-and-forget: readiness of the video pipeline is
/// never awaited.
pub struct StreamLauncher {
    executable: PathBuf,
    region: String,
    streams: HashMap<String, StreamHandle>,
}

impl StreamLauncher {
    pub fn new(executable: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            region: region.into(),
            streams: HashMap::new(),
        }
    }

    /// Returns the tracked handle for `channel`, spawning the process only if
    /// none is tracked or the tracked one has exited.
    pub fn ensure_running(&mut self, channel: &str) -> Result<&StreamHandle, LaunchError> {
        match self.streams.entry(channel.to_string()) {
            Entry::Occupied(mut entry) => {
                match entry.get_mut().child.try_wait() {
                    Ok(None) => {
                        tracing::debug!(channel, pid = ?entry.get().pid, "stream already running");
                        Ok(entry.into_mut())
                    }
                    status => {
                        match status {
                            Ok(Some(exit)) => {
                                tracing::info!(channel, %exit, "stream process exited, relaunching")
                            }
                            _ => tracing::warn!(channel, "stream liveness check failed, relaunching"),
                        }

                        let child = spawn_stream(&self.executable, &self.region, channel)?;
                        *entry.get_mut() = StreamHandle {
                            pid: child.id(),
                            child,
                        };
                        Ok(entry.into_mut())
                    }
                }
            }
            Entry::Vacant(entry) => {
                let child = spawn_stream(&self.executable, &self.region, channel)?;
                Ok(entry.insert(StreamHandle {
                    pid: child.id(),
                    child,
                }))
            }
        }
    }

    pub fn is_running(&mut self, channel: &str) -> bool {
        self.streams
            .get_mut(channel)
            .is_some_and(|handle| matches!(handle.child.try_wait(), Ok(None)))
    }

    /// Best-effort kill of every tracked process.
    pub fn stop_all(&mut self) {
        for (channel, mut handle) in self.streams.drain() {
            match handle.child.start_kill() {
                Ok(()) => tracing::info!(channel, pid = ?handle.pid, "stream process stopped"),
                Err(e) => tracing::warn!(channel, "failed to stop stream process: {e}"),
            }
        }
    }
}

fn spawn_stream(executable: &Path, region: &str, channel: &str) -> Result<Child, LaunchError> {
    let child = Command::new(executable)
        .arg(channel)
        .env("AWS_DEFAULT_REGION", region)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            executable: executable.to_path_buf(),
            source,
        })?;

    tracing::info!(channel, pid = ?child.id(), "stream process launched");

    Ok(child)
}
