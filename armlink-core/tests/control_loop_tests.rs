// File: armlink-core/tests/control_loop_tests.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use armlink_core::{
    control::{
        ControlLoop, STATUS_CALIBRATED, STATUS_CALIBRATION_FAILED, STATUS_CONNECTED,
        STATUS_CONNECTION_LOST, STATUS_CONNECT_FAILED, STATUS_PRESS_TRIGGER,
    },
    models::{CalibrationStatus, ConnectionState, ControllerSample, Pose, TeleopConfig},
    Error,
};
use armlink_core::test_utils::helpers::*;

const WAIT: Duration = Duration::from_secs(5);

fn config(arm_url: &str) -> TeleopConfig {
    TeleopConfig {
        arm_url: arm_url.to_string(),
        tick_interval_ms: 10,
        poll_interval_ms: 50,
        connect_timeout_ms: Some(2000),
        ..TeleopConfig::default()
    }
}

fn build(arm_url: &str) -> (ControlLoop, SampleFeed, Arc<ScriptedFetcher>, Arc<RecordingSink>) {
    let (sampler, feed) = ScriptedSampler::new();
    let fetcher = Arc::new(ScriptedFetcher::new(Ok(png_fixture(4, 3, [10, 20, 30, 255]))));
    let sink = Arc::new(RecordingSink::default());
    let control = ControlLoop::new(
        &config(arm_url),
        Box::new(sampler),
        fetcher.clone(),
        Some(sink.clone()),
    );
    (control, feed, fetcher, sink)
}

fn status_text(control: &ControlLoop) -> String {
    control.status_handle().snapshot().status_text
}

async fn calibrate(control: &mut ControlLoop, feed: &SampleFeed, origin: Pose) {
    feed.push(ControllerSample::at(origin).with_trigger(1.0));
    let ok = tick_until(control, WAIT, |c| {
        c.calibration().status() == CalibrationStatus::Calibrated && c.connection().is_open()
    })
    .await;
    assert!(ok, "controller never calibrated");
}

#[tokio::test]
async fn test_initial_status() {
    let (control, _feed, _fetcher, _sink) = build(&unreachable_ws_url());
    let snapshot = control.status_handle().snapshot();
    assert!(!snapshot.is_connected);
    assert!(!snapshot.is_calibrated);
    assert_eq!(snapshot.last_command, "None");
    assert_eq!(snapshot.status_text, STATUS_PRESS_TRIGGER);
    assert_eq!(snapshot.frames_received, 0);
}

#[tokio::test]
async fn test_no_sample_no_command() -> Result<(), Error> {
    let (mut control, _feed, _fetcher, _sink) = build(&unreachable_ws_url());
    assert_eq!(control.tick()?, None);
    assert_eq!(control.calibration().status(), CalibrationStatus::Uncalibrated);
    Ok(())
}

#[tokio::test]
async fn test_calibrate_then_move() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (mut control, feed, _fetcher, _sink) = build(&arm.url);

    calibrate(&mut control, &feed, Pose::new(0.0, 1.0, 0.0)).await;

    feed.push(ControllerSample::at(Pose::new(0.0, 1.5, 0.1)));
    let sent = control.tick()?.expect("a move is sent while calibrated and open");
    assert_eq!(sent.to_wire()?, r#"{"cmd":"move","x":2.00,"y":10.00,"z":0}"#);

    let expected = r#"{"cmd":"move","x":2.00,"y":10.00,"z":0}"#.to_string();
    assert!(wait_until(WAIT, || arm.received().last() == Some(&expected)).await);
    let received = arm.received();
    assert_eq!(received.first().map(String::as_str), Some(r#"{"cmd":"home"}"#));

    let snapshot = control.status_handle().snapshot();
    assert!(snapshot.is_connected);
    assert!(snapshot.is_calibrated);
    assert_eq!(snapshot.last_command, "X: 2.00, Y: 10.00");
    assert_eq!(snapshot.status_text, STATUS_CALIBRATED);
    Ok(())
}

#[tokio::test]
async fn test_camera_frames_flow_once_calibrated() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (mut control, feed, fetcher, sink) = build(&arm.url);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(fetcher.call_count(), 0, "camera polled before calibration");

    calibrate(&mut control, &feed, Pose::default()).await;

    let frames = control.frames();
    assert!(wait_until(WAIT, || frames.sequence() >= 2).await);
    assert_eq!(frames.dimensions(), Some((4, 3)));
    assert!(sink.presented().len() >= 2);
    assert!(control.status_handle().snapshot().frames_received >= 2);
    Ok(())
}

#[tokio::test]
async fn test_connect_failure_sends_nothing() -> Result<(), Error> {
    let (mut control, feed, fetcher, _sink) = build(&unreachable_ws_url());
    feed.push(ControllerSample::at(Pose::new(0.0, 1.0, 0.0)).with_trigger(1.0));

    let aborted = tick_until(&mut control, WAIT, |c| status_text(c) == STATUS_CALIBRATION_FAILED).await;
    assert!(aborted);
    assert_eq!(control.connection().state(), ConnectionState::Failed);
    assert_eq!(control.calibration().status(), CalibrationStatus::Uncalibrated);

    // Moving around without a connection produces no commands.
    feed.push(ControllerSample::at(Pose::new(0.0, 1.5, 0.1)).with_trigger(1.0));
    for _ in 0..5 {
        assert_eq!(control.tick()?, None);
    }
    let snapshot = control.status_handle().snapshot();
    assert_eq!(snapshot.last_command, "None");
    assert!(!snapshot.is_calibrated);
    assert_eq!(fetcher.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_grip_reconnects_after_transport_failure() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (mut control, feed, _fetcher, _sink) = build(&arm.url);
    let origin = Pose::new(0.0, 1.0, 0.0);
    calibrate(&mut control, &feed, origin).await;

    arm.sever_all();
    assert!(tick_until(&mut control, WAIT, |c| status_text(c) == STATUS_CONNECT_FAILED).await);
    assert!(!control.status_handle().snapshot().is_connected);
    assert_eq!(control.tick()?, None);

    feed.push(ControllerSample::at(origin).with_grip(1.0));
    let back = tick_until(&mut control, WAIT, |c| {
        c.connection().is_open() && status_text(c) == STATUS_CONNECTED
    })
    .await;
    assert!(back);

    // Holding grip does not open further sessions.
    for _ in 0..10 {
        control.tick()?;
    }
    assert_eq!(arm.accepted(), 2);
    assert_eq!(control.calibration().origin(), Some(origin));
    assert_eq!(control.calibration().poller().start_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_peer_close_shows_connection_lost() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (mut control, feed, _fetcher, _sink) = build(&arm.url);
    calibrate(&mut control, &feed, Pose::default()).await;

    arm.close_all();
    assert!(tick_until(&mut control, WAIT, |c| status_text(c) == STATUS_CONNECTION_LOST).await);
    assert_eq!(control.connection().state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_arm_and_camera() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (mut control, feed, _fetcher, _sink) = build(&arm.url);
    calibrate(&mut control, &feed, Pose::default()).await;

    control.shutdown().await?;
    assert_eq!(control.connection().state(), ConnectionState::Disconnected);
    assert!(!control.calibration().poller().is_running());
    assert!(wait_until(WAIT, || arm.active() == 0).await);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_during_connect_leaves_nothing_open() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (mut control, feed, _fetcher, _sink) = build(&arm.url);

    feed.push(ControllerSample::at(Pose::default()).with_trigger(1.0));
    control.tick()?;
    assert!(control.calibration().is_connect_pending());

    control.shutdown().await?;
    assert!(!control.calibration().is_connect_pending());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(control.connection().state(), ConnectionState::Disconnected);
    assert!(wait_until(WAIT, || arm.active() == 0).await, "a session outlived shutdown");
    Ok(())
}

#[tokio::test]
async fn test_shutdown_abandons_a_stalled_handshake() -> Result<(), Error> {
    // Accepts TCP but never answers the WebSocket upgrade.
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/ws", silent.local_addr()?);
    let (mut control, feed, _fetcher, _sink) = build(&url);

    feed.push(ControllerSample::at(Pose::default()).with_trigger(1.0));
    control.tick()?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(control.connection().state(), ConnectionState::Connecting);

    tokio::time::timeout(Duration::from_millis(500), control.shutdown())
        .await
        .expect("shutdown waited on the handshake")?;
    assert_eq!(control.connection().state(), ConnectionState::Disconnected);
    drop(silent);
    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (control, feed, _fetcher, _sink) = build(&arm.url);
    let status = control.status_handle();
    let connection = control.connection().clone();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let runner = tokio::spawn(control.run(async {
        let _ = stop_rx.await;
    }));

    feed.push(ControllerSample::at(Pose::new(0.0, 1.0, 0.0)).with_trigger(1.0));
    assert!(wait_until(WAIT, || status.snapshot().is_connected).await);

    feed.push(ControllerSample::at(Pose::new(0.0, 1.5, 0.1)));
    assert!(wait_until(WAIT, || status.snapshot().last_command == "X: 2.00, Y: 10.00").await);

    let _ = stop_tx.send(());
    let result = tokio::time::timeout(WAIT, runner)
        .await
        .expect("run loop did not stop")
        .expect("run loop panicked");
    assert!(result.is_ok());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(wait_until(WAIT, || arm.active() == 0).await);
    Ok(())
}
