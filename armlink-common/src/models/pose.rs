// File: armlink-common/src/models/pose.rs

use std::ops::Sub;
use serde::{Deserialize, Serialize};

/// A position in tracking space, in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Pose) -> f64 {
        let d = *self - *other;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }
}

impl Sub for Pose {
    type Output = Pose;

    fn sub(self, rhs: Pose) -> Pose {
        Pose::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// One tick worth of controller input.
///
/// On the wire (JSON lines) the controller position is flattened into the
/// top-level object:
/// `{"x":0.0,"y":1.0,"z":0.0,"trigger":0.0,"grip":0.0,"head":{"x":0.0,"y":1.6,"z":0.0}}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerSample {
    #[serde(flatten)]
    pub position: Pose,

    /// Analog trigger value in `[0, 1]`.
    #[serde(default)]
    pub trigger: f32,

    /// Analog grip value in `[0, 1]`.
    #[serde(default)]
    pub grip: f32,

    /// Headset position, when the source tracks one.
    #[serde(default)]
    pub head: Option<Pose>,
}

impl ControllerSample {
    pub fn at(position: Pose) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_trigger(mut self, value: f32) -> Self {
        self.trigger = value;
        self
    }

    pub fn with_grip(mut self, value: f32) -> Self {
        self.grip = value;
        self
    }

    pub fn with_head(mut self, head: Pose) -> Self {
        self.head = Some(head);
        self
    }
}
