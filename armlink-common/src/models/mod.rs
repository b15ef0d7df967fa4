// File: armlink-common/src/models/mod.rs
pub mod pose;
pub mod command;
pub mod connection;
pub mod calibration;
pub mod frame;
pub mod status;
pub mod config;

pub use pose::{ControllerSample, Pose};
pub use command::{Command, CommandKind};
pub use connection::{ArmTelemetry, ConnectionEvent, ConnectionState};
pub use calibration::{CalibrationRecord, CalibrationStatus};
pub use frame::Frame;
pub use status::StatusSnapshot;
pub use config::TeleopConfig;
