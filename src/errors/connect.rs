/// Failures establishing the broker connection. Transient connect errors are
/// retried with backoff inside the controller; only an exhausted retry budget
/// surfaces as terminal.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("broker connect retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("controller already started")]
    AlreadyStarted,

    #[error("failed to read credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid client certificate or key: {0}")]
    Tls(#[from] rumqttc::tokio_rustls::rustls::Error),

    #[error("no usable private key found in key file")]
    NoPrivateKey,
}
