// File: armlink-core/tests/connection_tests.rs

use std::time::Duration;

use armlink_core::{
    connection::{ConnectionEvents, ConnectionManager},
    models::{ArmTelemetry, Command, ConnectionEvent, ConnectionState},
    Error,
};
use armlink_core::test_utils::helpers::*;

const WAIT: Duration = Duration::from_secs(5);

fn drain(events: &mut ConnectionEvents) -> Vec<ConnectionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_home_is_sent_before_anything_else() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (manager, _events) = ConnectionManager::new(None);

    manager.connect(&arm.url).await?;
    assert_eq!(manager.state(), ConnectionState::Open);
    manager.send(&Command::move_to(2.0, 10.0))?;

    let received = arm.wait_for_messages(2, WAIT).await;
    assert_eq!(
        received,
        vec![
            r#"{"cmd":"home"}"#.to_string(),
            r#"{"cmd":"move","x":2.00,"y":10.00,"z":0}"#.to_string(),
        ]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_home_precedes_moves_sent_from_other_threads() -> Result<(), Error> {
    for _ in 0..50 {
        let arm = TestActuator::spawn().await?;
        let (manager, _events) = ConnectionManager::new(None);

        // Sends a move the instant the connection reports open.
        let watcher = manager.clone();
        let mover = tokio::task::spawn_blocking(move || {
            let deadline = std::time::Instant::now() + WAIT;
            while std::time::Instant::now() < deadline {
                if watcher.is_open() {
                    return watcher.send(&Command::move_to(1.0, 1.0)).is_ok();
                }
                std::hint::spin_loop();
            }
            false
        });

        manager.connect(&arm.url).await?;
        assert!(mover.await.expect("mover task panicked"));

        let received = arm.wait_for_messages(2, WAIT).await;
        assert_eq!(received[0], r#"{"cmd":"home"}"#);
        assert_eq!(received[1], r#"{"cmd":"move","x":1.00,"y":1.00,"z":0}"#);
        manager.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_connect_reports_once_and_blocks_sends() -> Result<(), Error> {
    let (manager, mut events) = ConnectionManager::new(Some(Duration::from_secs(2)));

    let result = manager.connect(&unreachable_ws_url()).await;
    assert!(matches!(result, Err(Error::Connect(_))), "got {result:?}");
    assert_eq!(manager.state(), ConnectionState::Failed);

    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1, "exactly one notification expected: {seen:?}");
    match &seen[0] {
        ConnectionEvent::Error { message } => assert!(!message.is_empty()),
        other => panic!("expected an error notification, got {other:?}"),
    }

    let send = manager.send(&Command::move_to(1.0, 1.0));
    assert!(matches!(send, Err(Error::NotOpen(ConnectionState::Failed))));
    assert_eq!(manager.sessions_opened(), 0);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_replaces_the_previous_session() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (manager, mut events) = ConnectionManager::new(None);

    manager.connect(&arm.url).await?;
    manager.connect(&arm.url).await?;

    assert!(wait_until(WAIT, || arm.accepted() == 2 && arm.active() == 1).await);
    assert_eq!(arm.max_active(), 1, "two sessions were open at once");
    assert_eq!(manager.sessions_opened(), 2);

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            ConnectionEvent::Opened { url: arm.url.clone() },
            ConnectionEvent::Closed { reason: None, requested: true },
            ConnectionEvent::Opened { url: arm.url.clone() },
        ]
    );

    // Both sessions start by homing the arm.
    let received = arm.wait_for_messages(2, WAIT).await;
    assert_eq!(received, vec![r#"{"cmd":"home"}"#.to_string(); 2]);
    Ok(())
}

#[tokio::test]
async fn test_close_is_graceful_and_idempotent() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (manager, mut events) = ConnectionManager::new(None);

    // Nothing open yet.
    tokio_test::assert_ok!(manager.close().await);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(drain(&mut events).is_empty());

    manager.connect(&arm.url).await?;
    manager.close().await?;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(wait_until(WAIT, || arm.active() == 0).await);

    manager.close().await?;
    let seen = drain(&mut events);
    assert_eq!(seen.len(), 2, "{seen:?}");
    assert_eq!(seen[1], ConnectionEvent::Closed { reason: None, requested: true });
    Ok(())
}

#[tokio::test]
async fn test_peer_close_marks_disconnected() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (manager, mut events) = ConnectionManager::new(None);
    manager.connect(&arm.url).await?;
    arm.wait_for_messages(1, WAIT).await;

    arm.close_all();
    assert!(wait_until(WAIT, || manager.state() == ConnectionState::Disconnected).await);

    let seen = drain(&mut events);
    assert!(matches!(seen.last(), Some(ConnectionEvent::Closed { requested: false, .. })), "{seen:?}");
    assert!(!seen.iter().any(|e| matches!(e, ConnectionEvent::Error { .. })));
    assert!(matches!(manager.send(&Command::home()), Err(Error::NotOpen(_))));
    Ok(())
}

#[tokio::test]
async fn test_severed_transport_marks_failed() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (manager, mut events) = ConnectionManager::new(None);
    manager.connect(&arm.url).await?;
    arm.wait_for_messages(1, WAIT).await;

    arm.sever_all();
    assert!(wait_until(WAIT, || manager.state() == ConnectionState::Failed).await);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, ConnectionEvent::Error { .. })), "{seen:?}");
    assert!(matches!(seen.last(), Some(ConnectionEvent::Closed { requested: false, .. })));
    Ok(())
}

#[tokio::test]
async fn test_arm_replies_are_kept_as_telemetry() -> Result<(), Error> {
    let arm = TestActuator::spawn().await?;
    let (manager, _events) = ConnectionManager::new(None);
    assert!(manager.telemetry().is_none());

    manager.connect(&arm.url).await?;
    assert!(wait_until(WAIT, || manager.telemetry().is_some()).await);
    assert_eq!(
        manager.telemetry(),
        Some(ArmTelemetry { stepper: 12, base: -3, joint2: 40, claw: 0 })
    );
    Ok(())
}
