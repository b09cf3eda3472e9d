use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use bellhost::configs::Settings;
use bellhost::models::{Command, CommandKind, DeviceEvent};
use bellhost::services::{DeviceAction, DeviceController, EventSink, StreamLauncher};

mod common;
use common::{CountingAction, FailingSink, QueueChannel, RecordingSink};

fn controller_with(
    settings: Settings,
    sink: Arc<dyn EventSink>,
    action: Arc<dyn DeviceAction>,
) -> Arc<DeviceController> {
    let launcher = StreamLauncher::new(
        settings.stream.executable.clone(),
        settings.device.region.clone(),
    );

    Arc::new(DeviceController::new(
        Arc::new(settings),
        sink,
        None,
        launcher,
        action,
    ))
}

#[tokio::test]
async fn test_trigger_publishes_one_ring_per_trigger() {
    let sink = Arc::new(RecordingSink::default());
    let controller = controller_with(
        common::test_settings(),
        sink.clone(),
        Arc::new(CountingAction::default()),
    );
    controller.force_ready().await;

    let before = OffsetDateTime::now_utc().unix_timestamp();
    controller.on_trigger().await;
    controller.on_trigger().await;
    let after = OffsetDateTime::now_utc().unix_timestamp();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert!(matches!(event, DeviceEvent::Ring { .. }));
        assert_eq!(event.channel(), "300");
        assert_eq!(event.topic(), "doorbell/300/ring");
        assert!(event.timestamp() >= before && event.timestamp() <= after);
    }

    controller.shutdown().await;
}

#[tokio::test]
async fn test_trigger_ignored_unless_ready() {
    let sink = Arc::new(RecordingSink::default());
    let controller = controller_with(
        common::test_settings(),
        sink.clone(),
        Arc::new(CountingAction::default()),
    );

    controller.on_trigger().await;

    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_launch_failure_does_not_block_ring() {
    let mut settings = common::test_settings();
    settings.stream.executable = String::from("/nonexistent/webrtc-master");

    let sink = Arc::new(RecordingSink::default());
    let controller = controller_with(settings, sink.clone(), Arc::new(CountingAction::default()));
    controller.force_ready().await;

    controller.on_trigger().await;

    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_contained() {
    let controller = controller_with(
        common::test_settings(),
        Arc::new(FailingSink),
        Arc::new(CountingAction::default()),
    );
    controller.force_ready().await;

    // Must not panic or poison the controller.
    controller.on_trigger().await;
    controller.on_trigger().await;

    controller.shutdown().await;
}

#[tokio::test]
async fn test_redelivered_command_fires_action_once() {
    let action = Arc::new(CountingAction::default());
    let controller = controller_with(
        common::test_settings(),
        Arc::new(RecordingSink::default()),
        action.clone(),
    );
    controller.force_ready().await;

    let command = Command::new(CommandKind::OpenDoor, 5);
    controller.on_command(command.clone()).await;
    controller.on_command(command).await;

    assert_eq!(action.invocations(), 1);
}

#[tokio::test]
async fn test_newer_marker_fires_again() {
    let action = Arc::new(CountingAction::default());
    let controller = controller_with(
        common::test_settings(),
        Arc::new(RecordingSink::default()),
        action.clone(),
    );
    controller.force_ready().await;

    controller.on_command(Command::new(CommandKind::OpenDoor, 5)).await;
    controller.on_command(Command::new(CommandKind::OpenDoor, 6)).await;

    assert_eq!(action.invocations(), 2);
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let action = Arc::new(CountingAction::default());
    let controller = controller_with(
        common::test_settings(),
        Arc::new(RecordingSink::default()),
        action.clone(),
    );
    controller.force_ready().await;

    controller
        .on_command(Command::new(
            CommandKind::Unknown(String::from("SELF_DESTRUCT")),
            5,
        ))
        .await;

    assert_eq!(action.invocations(), 0);
}

#[tokio::test]
async fn test_command_ignored_unless_ready() {
    let action = Arc::new(CountingAction::default());
    let controller = controller_with(
        common::test_settings(),
        Arc::new(RecordingSink::default()),
        action.clone(),
    );

    controller.on_command(Command::new(CommandKind::OpenDoor, 5)).await;

    assert_eq!(action.invocations(), 0);
}

#[tokio::test]
async fn test_command_loop_dispatches_then_stops_on_shutdown() {
    let action = Arc::new(CountingAction::default());
    let controller = controller_with(
        common::test_settings(),
        Arc::new(RecordingSink::default()),
        action.clone(),
    );
    controller.force_ready().await;

    let (channel, queue) = QueueChannel::new();
    queue
        .lock()
        .unwrap()
        .push_back(Command::new(CommandKind::OpenDoor, 1));

    let handle = Arc::clone(&controller).spawn_command_loop(Box::new(channel));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(action.invocations(), 1);

    controller.shutdown().await;

    // The loop observes shutdown within one polling interval.
    tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .expect("command loop did not stop")
        .unwrap();

    // Nothing queued after shutdown is ever dispatched.
    queue
        .lock()
        .unwrap()
        .push_back(Command::new(CommandKind::OpenDoor, 2));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(action.invocations(), 1);
}
