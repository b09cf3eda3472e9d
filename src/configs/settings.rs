use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

/// MQTT broker connection. The endpoint carries no default: it identifies the
/// account-specific IoT endpoint and must come from deployment config or the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    pub endpoint: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub auth: Option<GatewayAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAuth {
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Signaling channel name; also names the ring topic.
    pub channel: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub executable: String,
    pub stop_on_shutdown: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSource {
    pub file: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controller {
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// None means retry forever.
    pub max_connect_retries: Option<u32>,
    pub shutdown_timeout_ms: u64,
    /// None disables the heartbeat task.
    pub heartbeat_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub gateway: Gateway,
    pub device: Device,
    pub stream: Stream,
    pub command: CommandSource,
    pub controller: Controller,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        let settings: Settings = Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::default().separator("_"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    /// Rejects incomplete configuration before any connection attempt is made.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "gateway.endpoint must be set to the broker endpoint".into(),
            ));
        }
        if self.device.channel.is_empty() {
            return Err(ConfigError::Message(
                "device.channel must be set to the signaling channel name".into(),
            ));
        }
        match &self.gateway.auth {
            None => {
                return Err(ConfigError::Message(
                    "gateway.auth credential paths must be set".into(),
                ));
            }
            Some(auth) => {
                for (field, value) in [
                    ("gateway.auth.cert_path", &auth.cert_path),
                    ("gateway.auth.key_path", &auth.key_path),
                    ("gateway.auth.ca_path", &auth.ca_path),
                ] {
                    if value.is_empty() {
                        return Err(ConfigError::Message(format!("{field} must be set")));
                    }
                }
            }
        }
        if self.stream.executable.is_empty() {
            return Err(ConfigError::Message("stream.executable must be set".into()));
        }

        Ok(())
    }
}
