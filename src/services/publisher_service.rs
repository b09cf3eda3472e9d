use std::time::Duration;
use std::{fs, io};

use async_trait::async_trait;
use rumqttc::tokio_rustls::rustls::{ClientConfig, RootCertStore};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS, TlsConfiguration, Transport};
use rustls_pemfile::{Item, certs, read_one};

use crate::configs::Gateway;
use crate::errors::{ConnectError, PublishError};
use crate::models::DeviceEvent;

/// Outbound side of the messaging client: serializes a domain event and
/// publishes it with at-least-once delivery. No internal retry; backoff
/// policy stays in the controller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &DeviceEvent) -> Result<(), PublishError>;
}

#[derive(Clone)]
pub struct MqttEventPublisher {
    client: AsyncClient,
}

impl MqttEventPublisher {
    /// Builds the broker client and its event loop. The event loop is handed
    /// to the controller, which owns the connection lifecycle.
    pub fn new(gateway: &Gateway) -> Result<(Self, EventLoop), ConnectError> {
        let mut options = MqttOptions::new(&gateway.client_id, &gateway.endpoint, gateway.port);
        options.set_keep_alive(Duration::from_secs(gateway.keep_alive_secs));
        options.set_clean_session(false);

        if let Some(auth) = &gateway.auth {
            let mut root_cert_store = RootCertStore::empty();
            for cert in certs(&mut io::BufReader::new(fs::File::open(&auth.ca_path)?)) {
                root_cert_store.add(cert?)?;
            }

            let client_certs = certs(&mut io::BufReader::new(fs::File::open(&auth.cert_path)?))
                .collect::<Result<Vec<_>, _>>()?;
            let mut key_buffer = io::BufReader::new(fs::File::open(&auth.key_path)?);
            let key = loop {
                match read_one(&mut key_buffer)? {
                    Some(Item::Sec1Key(key)) => break key.into(),
                    Some(Item::Pkcs1Key(key)) => break key.into(),
                    Some(Item::Pkcs8Key(key)) => break key.into(),
                    None => return Err(ConnectError::NoPrivateKey),
                    _ => {}
                }
            };

            let tls_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_client_auth_cert(client_certs, key)?;

            options.set_transport(Transport::Tls(TlsConfiguration::from(tls_config)));
        }

        let (client, event_loop) = AsyncClient::new(options, 10);

        Ok((Self { client }, event_loop))
    }

    /// Clone of the underlying client, for connection-lifecycle calls
    /// (disconnect) that are not publishing.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}

#[async_trait]
impl EventSink for MqttEventPublisher {
    async fn publish(&self, event: &DeviceEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        let topic = event.topic();

        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await?;

        tracing::debug!(%topic, "event handed to broker client");

        Ok(())
    }
}
