// File: armlink-common/src/models/connection.rs

use std::fmt;
use serde::{Deserialize, Serialize};

/// Health of the persistent command connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Failed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle notifications emitted by the connection manager.
/// These take the place of open/error/close callbacks; the control loop
/// drains them once per tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened { url: String },
    Error { message: String },
    Closed {
        reason: Option<String>,
        /// `true` when the close came from an explicit `close()`/reconnect.
        requested: bool,
    },
}

/// Encoder positions the arm reports back after each message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmTelemetry {
    pub stepper: i64,
    pub base: i64,
    pub joint2: i64,
    pub claw: i64,
}

impl ArmTelemetry {
    pub fn parse(text: &str) -> Option<ArmTelemetry> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoder_report() {
        let t = ArmTelemetry::parse(r#"{"stepper":120,"base":-4,"joint2":33,"claw":0}"#).unwrap();
        assert_eq!(t, ArmTelemetry { stepper: 120, base: -4, joint2: 33, claw: 0 });
    }

    #[test]
    fn test_parse_rejects_other_frames() {
        assert!(ArmTelemetry::parse("Move command received").is_none());
        assert!(ArmTelemetry::parse(r#"{"stepper":1}"#).is_none());
    }
}
