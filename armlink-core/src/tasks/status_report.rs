// armlink-core/src/tasks/status_report.rs

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

use crate::control::StatusHandle;

/// Spawns a background task that logs the controller status every
/// `interval`, for operators watching the console.
pub fn spawn_status_report_task(status: StatusHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            let snapshot = status.snapshot();
            info!(
                "Arm Status Update: connected={}, calibrated={}, last_command={}, frames={}, telemetry={:?}",
                snapshot.is_connected,
                snapshot.is_calibrated,
                snapshot.last_command,
                snapshot.frames_received,
                snapshot.telemetry,
            );
        }
    })
}
