/// Failures publishing a device event. The publisher never retries; the
/// controller decides whether a failed publish matters.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker rejected publish: {0}")]
    Broker(#[from] rumqttc::ClientError),

    #[error("not connected to broker")]
    NotConnected,
}
