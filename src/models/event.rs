use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Domain event emitted by the device. The `event` tag is part of the wire
/// format consumed by the remote viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Ring { channel: String, timestamp: i64 },
    Heartbeat { channel: String, timestamp: i64 },
}

impl DeviceEvent {
    pub fn ring(channel: impl Into<String>) -> Self {
        Self::Ring {
            channel: channel.into(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn heartbeat(channel: impl Into<String>) -> Self {
        Self::Heartbeat {
            channel: channel.into(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::Ring { channel, .. } | Self::Heartbeat { channel, .. } => channel,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Ring { timestamp, .. } | Self::Heartbeat { timestamp, .. } => *timestamp,
        }
    }

    /// MQTT topic this event is published to.
    pub fn topic(&self) -> String {
        match self {
            Self::Ring { channel, .. } => format!("doorbell/{channel}/ring"),
            Self::Heartbeat { channel, .. } => format!("doorbell/{channel}/heartbeat"),
        }
    }
}
