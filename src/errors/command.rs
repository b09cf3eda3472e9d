/// Failures while reading the command source. Non-fatal: the polling loop
/// logs these and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum CommandChannelError {
    #[error("command source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
