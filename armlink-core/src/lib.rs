// src/lib.rs

pub mod connection;
pub mod encoder;
pub mod calibration;
pub mod video;
pub mod control;
pub mod input;
pub mod sinks;
pub mod tasks;
pub mod test_utils;

pub use armlink_common::error::Error;
pub use armlink_common::models;
pub use armlink_common::traits;
pub use connection::{ConnectionEvents, ConnectionManager};
pub use calibration::{CalibrationEvent, CalibrationStateMachine};
pub use control::{ControlLoop, StatusHandle};
pub use encoder::CommandEncoder;
pub use video::{FrameBuffer, FrameFetcher, HttpFrameFetcher, VideoPoller};
