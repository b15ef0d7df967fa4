// File: src/encoder.rs

use armlink_common::models::{Command, Pose};

/// Metres of controller travel to arm units.
pub const DEFAULT_GAIN: f64 = 20.0;

/// Maps the controller's offset from the calibration origin onto a flat
/// `move` command. Forward travel (z) drives the arm's x, vertical travel
/// drives y, and z is always zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandEncoder {
    gain: f64,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self { gain: DEFAULT_GAIN }
    }
}

impl CommandEncoder {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn encode(&self, origin: Pose, current: Pose) -> Command {
        let relative = current - origin;
        Command::move_to(relative.z * self.gain, relative.y * self.gain)
    }
}
