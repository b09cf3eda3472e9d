#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use bellhost::configs::{
    CommandSource, Controller, Device, Gateway, Logger, Settings, Stream,
};
use bellhost::errors::{CommandChannelError, PublishError};
use bellhost::models::{Command, DeviceEvent};
use bellhost::services::{CommandChannel, DeviceAction, EventSink};

/// Settings for controller tests: no broker auth, `sleep` as the stream
/// executable (the channel name doubles as its duration), short intervals.
pub fn test_settings() -> Settings {
    Settings {
        logger: Logger {
            level: String::from("debug"),
        },
        gateway: Gateway {
            endpoint: String::from("127.0.0.1"),
            port: 1883,
            client_id: String::from("doorbell-test"),
            keep_alive_secs: 5,
            auth: None,
        },
        device: Device {
            channel: String::from("300"),
            region: String::from("us-east-1"),
        },
        stream: Stream {
            executable: String::from("sleep"),
            stop_on_shutdown: true,
        },
        command: CommandSource {
            file: String::from("/tmp/doorbell_commands.json"),
            poll_interval_ms: 50,
        },
        controller: Controller {
            backoff_base_ms: 10,
            backoff_cap_ms: 40,
            max_connect_retries: None,
            shutdown_timeout_ms: 500,
            heartbeat_interval_secs: None,
        },
    }
}

/// EventSink that records every published event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DeviceEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &DeviceEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());

        Ok(())
    }
}

/// EventSink that rejects every publish.
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _event: &DeviceEvent) -> Result<(), PublishError> {
        Err(PublishError::NotConnected)
    }
}

/// Device action that counts invocations instead of toggling hardware.
#[derive(Default)]
pub struct CountingAction {
    invocations: AtomicUsize,
}

impl CountingAction {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceAction for CountingAction {
    async fn open_door(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// In-memory command channel; the test side keeps the queue handle to feed
/// commands while the polling loop owns the channel.
pub struct QueueChannel {
    queue: Arc<Mutex<VecDeque<Command>>>,
}

impl QueueChannel {
    pub fn new() -> (Self, Arc<Mutex<VecDeque<Command>>>) {
        let queue = Arc::new(Mutex::new(VecDeque::new()));

        (
            Self {
                queue: queue.clone(),
            },
            queue,
        )
    }
}

#[async_trait]
impl CommandChannel for QueueChannel {
    async fn poll(&mut self) -> Result<Option<Command>, CommandChannelError> {
        Ok(self.queue.lock().unwrap().pop_front())
    }
}
