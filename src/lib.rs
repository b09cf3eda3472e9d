use std::error::Error;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;

use crate::configs::Settings;
use crate::services::{
    DeviceController, FileCommandChannel, LogDeviceAction, MqttEventPublisher, StreamLauncher,
};

pub mod configs;
pub mod errors;
pub mod models;
pub mod services;

/// Wires the services together and runs the device until stdin closes or an
/// interrupt arrives. A line on stdin simulates a button press.
pub async fn run(settings: Arc<Settings>) -> Result<(), Box<dyn Error>> {
    let (publisher, event_loop) = MqttEventPublisher::new(&settings.gateway)?;
    let client = publisher.client();

    let launcher = StreamLauncher::new(
        settings.stream.executable.clone(),
        settings.device.region.clone(),
    );

    let controller = Arc::new(DeviceController::new(
        settings.clone(),
        Arc::new(publisher),
        Some(client),
        launcher,
        Arc::new(LogDeviceAction),
    ));

    Arc::clone(&controller).start(event_loop).await?;

    let command_loop = Arc::clone(&controller)
        .spawn_command_loop(Box::new(FileCommandChannel::new(settings.command.file.clone())));
    let heartbeat_loop = Arc::clone(&controller).spawn_heartbeat_loop();

    tracing::info!("doorbell ready, press enter to ring (ctrl-c to exit)");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(_)) => {
                    tracing::info!("button pressed");
                    controller.on_trigger().await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("trigger input error: {e}");
                    break;
                }
            },
        }
    }

    controller.shutdown().await;

    let _ = command_loop.await;
    if let Some(heartbeat_loop) = heartbeat_loop {
        let _ = heartbeat_loop.await;
    }

    Ok(())
}
