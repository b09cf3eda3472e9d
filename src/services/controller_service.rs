use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rumqttc::{AsyncClient, Event, EventLoop, Packet};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::configs::Settings;
use crate::errors::{ConnectError, PublishError};
use crate::models::{Command, CommandKind, DeviceEvent};
use crate::services::{CommandChannel, DeviceAction, EventSink, StreamLauncher};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Connecting,
    Ready,
    ShuttingDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Capped exponential backoff for broker connect attempts. The raw delay
/// sequence is non-decreasing; jitter is applied only at sleep time.
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.cap);
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Random delay in `[delay / 2, delay]`, so concurrent reconnecting
    /// devices spread out their attempts.
    pub fn jittered(delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        if millis == 0 {
            return delay;
        }

        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }
}

/// The orchestrating state machine: owns the broker connection lifecycle,
/// the trigger → (launch stream, publish ring) transition, and command
/// dispatch into the device-action hook.
pub struct DeviceController {
    settings: Arc<Settings>,
    publisher: Arc<dyn EventSink>,
    client: Option<AsyncClient>,
    launcher: Mutex<StreamLauncher>,
    action: Arc<dyn DeviceAction>,
    state: RwLock<ControllerState>,
    connection: RwLock<ConnectionState>,
    last_marker: Mutex<Option<u64>>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceController {
    pub fn new(
        settings: Arc<Settings>,
        publisher: Arc<dyn EventSink>,
        client: Option<AsyncClient>,
        launcher: StreamLauncher,
        action: Arc<dyn DeviceAction>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            settings,
            publisher,
            client,
            launcher: Mutex::new(launcher),
            action,
            state: RwLock::new(ControllerState::Stopped),
            connection: RwLock::new(ConnectionState::Disconnected),
            last_marker: Mutex::new(None),
            shutdown_tx,
            event_loop_task: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ControllerState {
        *self.state.read().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection.read().await
    }

    /// Drives the broker event loop until the first ConnAck, retrying failed
    /// attempts with capped exponential backoff. With no retry budget
    /// configured this never returns until connected; with a budget, an
    /// exhausted budget is terminal. Once connected the event loop moves to a
    /// background task and the controller becomes Ready.
    pub async fn start(self: Arc<Self>, mut event_loop: EventLoop) -> Result<(), ConnectError> {
        {
            let mut state = self.state.write().await;
            if *state != ControllerState::Stopped {
                return Err(ConnectError::AlreadyStarted);
            }
            *state = ControllerState::Connecting;
        }
        *self.connection.write().await = ConnectionState::Connecting;
        tracing::info!(endpoint = %self.settings.gateway.endpoint, "connecting to broker");

        let mut backoff = self.new_backoff();
        let mut attempts: u32 = 0;

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!(code = ?ack.code, "broker connected");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    attempts += 1;

                    if let Some(max) = self.settings.controller.max_connect_retries {
                        if attempts >= max {
                            *self.state.write().await = ControllerState::Stopped;
                            *self.connection.write().await = ConnectionState::Disconnected;
                            tracing::error!(attempts, "broker connect failed: {e}");

                            return Err(ConnectError::RetriesExhausted { attempts });
                        }
                    }

                    let delay = backoff.next_delay();
                    tracing::warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "broker connect failed, retrying: {e}"
                    );
                    tokio::time::sleep(Backoff::jittered(delay)).await;
                }
            }
        }

        *self.connection.write().await = ConnectionState::Connected;
        *self.state.write().await = ControllerState::Ready;
        tracing::info!("controller ready");

        self.spawn_event_loop(event_loop).await;

        Ok(())
    }

    /// Button press. Valid only while Ready. The stream launch attempt is
    /// always issued before the ring publish for the same trigger, and a
    /// failure of either is logged without affecting the other.
    pub async fn on_trigger(&self) {
        if self.state().await != ControllerState::Ready {
            tracing::warn!("trigger ignored: controller not ready");
            return;
        }

        let channel = self.settings.device.channel.clone();

        match self.launcher.lock().await.ensure_running(&channel) {
            Ok(handle) => tracing::debug!(%channel, pid = ?handle.pid(), "stream active"),
            Err(e) => tracing::error!(%channel, "stream launch failed: {e}"),
        }

        if self.connection_state().await != ConnectionState::Connected {
            tracing::error!(%channel, "ring not published: {}", PublishError::NotConnected);
            return;
        }

        let event = DeviceEvent::ring(channel.clone());
        match self.publisher.publish(&event).await {
            Ok(()) => tracing::info!(%channel, timestamp = event.timestamp(), "ring published"),
            Err(e) => tracing::error!(%channel, "ring publish failed: {e}"),
        }
    }

    /// Dispatches an inbound command. Redeliveries are dropped by marker, so
    /// an at-least-once channel never fires the device action twice for the
    /// same command instance. Unknown kinds are logged and ignored.
    pub async fn on_command(&self, command: Command) {
        if self.state().await != ControllerState::Ready {
            tracing::warn!(marker = command.marker, "command ignored: controller not ready");
            return;
        }

        {
            let mut last_marker = self.last_marker.lock().await;
            if last_marker.is_some_and(|last| command.marker <= last) {
                tracing::debug!(marker = command.marker, "duplicate command dropped");
                return;
            }
            *last_marker = Some(command.marker);
        }

        match command.kind {
            CommandKind::OpenDoor => {
                tracing::info!(marker = command.marker, "dispatching open-door action");
                if let Err(e) = self.action.open_door().await {
                    tracing::error!("open-door action failed: {e}");
                }
            }
            CommandKind::Unknown(name) => {
                tracing::warn!(command = %name, "unknown command ignored");
            }
        }
    }

    /// Polls the command channel at the configured interval until shutdown.
    /// Channel errors are logged and polling continues.
    pub fn spawn_command_loop(
        self: Arc<Self>,
        mut channel: Box<dyn CommandChannel>,
    ) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_millis(self.settings.command.poll_interval_ms);
        let controller = self;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => match channel.poll().await {
                        Ok(Some(command)) => controller.on_command(command).await,
                        Ok(None) => {}
                        Err(e) => tracing::warn!("command channel error: {e}"),
                    },
                }
            }

            tracing::debug!("command loop stopped");
        })
    }

    /// Publishes periodic heartbeat events so the remote side can tell a
    /// quiet device from a dead one. No-op when no interval is configured.
    pub fn spawn_heartbeat_loop(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = Duration::from_secs(self.settings.controller.heartbeat_interval_secs?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let controller = self;

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        if controller.connection_state().await != ConnectionState::Connected {
                            continue;
                        }

                        let event =
                            DeviceEvent::heartbeat(controller.settings.device.channel.clone());
                        if let Err(e) = controller.publisher.publish(&event).await {
                            tracing::warn!("heartbeat publish failed: {e}");
                        }
                    }
                }
            }

            tracing::debug!("heartbeat loop stopped");
        }))
    }

    /// Bounded graceful shutdown: background loops observe the flag within
    /// one polling interval, the broker disconnect waits at most the
    /// configured timeout, and the stream process is stopped or left running
    /// per configuration.
    pub async fn shutdown(&self) {
        *self.state.write().await = ControllerState::ShuttingDown;
        tracing::info!("controller shutting down");

        self.shutdown_tx.send_replace(true);

        let timeout = Duration::from_millis(self.settings.controller.shutdown_timeout_ms);

        if let Some(client) = &self.client {
            match tokio::time::timeout(timeout, client.disconnect()).await {
                Ok(Ok(())) => tracing::info!("broker disconnected"),
                Ok(Err(e)) => tracing::warn!("broker disconnect failed: {e}"),
                Err(_) => tracing::error!("broker disconnect timed out, forcing shutdown"),
            }
        }

        if let Some(handle) = self.event_loop_task.lock().await.take() {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::error!("broker event loop did not stop in time, forcing shutdown");
            }
        }
        *self.connection.write().await = ConnectionState::Disconnected;

        if self.settings.stream.stop_on_shutdown {
            self.launcher.lock().await.stop_all();
        } else {
            tracing::info!("leaving stream process running");
        }

        *self.state.write().await = ControllerState::Stopped;
        tracing::info!("controller stopped");
    }

    /// Keeps the broker connection serviced after start: outgoing publishes
    /// are flushed here, and lost connections are re-established with the
    /// same backoff policy as the initial connect.
    async fn spawn_event_loop(self: Arc<Self>, mut event_loop: EventLoop) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut backoff = self.new_backoff();
        let controller = Arc::clone(&self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!("broker reconnected");
                            backoff.reset();
                            *controller.connection.write().await = ConnectionState::Connected;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            *controller.connection.write().await = ConnectionState::Connecting;
                            let delay = backoff.next_delay();
                            tracing::warn!(
                                delay_ms = delay.as_millis() as u64,
                                "broker connection lost, reconnecting: {e}"
                            );
                            // The backoff sleep must stay cancellable, or a
                            // long delay would stall shutdown.
                            tokio::select! {
                                _ = shutdown_rx.changed() => break,
                                _ = tokio::time::sleep(Backoff::jittered(delay)) => {}
                            }
                        }
                    },
                }
            }

            tracing::debug!("broker event loop stopped");
        });

        *self.event_loop_task.lock().await = Some(handle);
    }

    fn new_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.settings.controller.backoff_base_ms),
            Duration::from_millis(self.settings.controller.backoff_cap_ms),
        )
    }
}

#[cfg(any(test, feature = "mock"))]
impl DeviceController {
    /// Puts the controller into the Ready/Connected state without a broker,
    /// for tests exercising trigger and command dispatch.
    pub async fn force_ready(&self) {
        *self.state.write().await = ControllerState::Ready;
        *self.connection.write().await = ConnectionState::Connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_non_decreasing_and_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay()).collect();

        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_reset_restarts_from_base() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_delay() {
        let delay = Duration::from_secs(10);

        for _ in 0..100 {
            let jittered = Backoff::jittered(delay);
            assert!(jittered >= delay / 2 && jittered <= delay);
        }
    }
}
