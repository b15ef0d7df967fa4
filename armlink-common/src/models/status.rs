// File: armlink-common/src/models/status.rs

use serde::Serialize;
use crate::models::calibration::CalibrationStatus;
use crate::models::connection::{ArmTelemetry, ConnectionState};

/// Read-only view of the controller handed to display/UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub is_connected: bool,
    pub is_calibrated: bool,
    pub last_command: String,
    pub status_text: String,
    pub connection_state: ConnectionState,
    pub calibration_status: CalibrationStatus,
    pub telemetry: Option<ArmTelemetry>,
    pub frames_received: u64,
}
