use std::path::PathBuf;

/// OS-level failure spawning the external stream process. Non-fatal for the
/// ring path.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn stream process {executable:?}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
