// File: armlink-common/src/models/calibration.rs

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::pose::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationStatus {
    Uncalibrated,
    Calibrating,
    Calibrated,
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationStatus::Uncalibrated => write!(f, "uncalibrated"),
            CalibrationStatus::Calibrating => write!(f, "calibrating"),
            CalibrationStatus::Calibrated => write!(f, "calibrated"),
        }
    }
}

/// What was captured when the operator calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub origin: Pose,
    /// Head-to-controller distance plus padding, when a head pose was available.
    pub arm_length: Option<f64>,
    pub captured_at: DateTime<Utc>,
}
