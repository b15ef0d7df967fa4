// File: armlink-common/src/traits/mod.rs
//
// Boundaries to the collaborators that live outside the control loop:
// the input device and the display surface.

use crate::Error;
use crate::models::{ControllerSample, Frame};

/// Supplies the controller pose and analog values once per tick.
///
/// `sample` must not block; it returns the most recent reading, or `None`
/// before the first reading arrives.
pub trait PoseSampler: Send {
    fn sample(&mut self) -> Option<ControllerSample>;

    /// `true` once the source has ended and no further samples will arrive.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Presents the latest decoded camera frame.
pub trait FrameSink: Send + Sync {
    fn present(&self, frame: &Frame) -> Result<(), Error>;
}
