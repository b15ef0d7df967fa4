// File: armlink-common/src/models/command.rs

use std::fmt;
use serde::Serialize;
use serde_json::value::RawValue;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Home,
    Move,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Home => "home",
            CommandKind::Move => "move",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single motion command for the arm.
///
/// Move coordinates are stored already rounded to two decimals, so the
/// value written to the wire and the value shown to the operator are the
/// same formatted text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Serialize)]
struct MoveMessage<'a> {
    cmd: &'static str,
    x: &'a RawValue,
    y: &'a RawValue,
    z: u8,
}

#[derive(Serialize)]
struct HomeMessage {
    cmd: &'static str,
}

impl Command {
    pub fn home() -> Self {
        Self {
            kind: CommandKind::Home,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn move_to(x: f64, y: f64) -> Self {
        Self {
            kind: CommandKind::Move,
            x: round2(x),
            y: round2(y),
            z: 0.0,
        }
    }

    pub fn formatted_x(&self) -> String {
        format!("{:.2}", self.x)
    }

    pub fn formatted_y(&self) -> String {
        format!("{:.2}", self.y)
    }

    /// Serializes to the actuator's JSON text format:
    /// `{"cmd":"home"}` or `{"cmd":"move","x":1.25,"y":-0.50,"z":0}`.
    pub fn to_wire(&self) -> Result<String, Error> {
        match self.kind {
            CommandKind::Home => Ok(serde_json::to_string(&HomeMessage { cmd: "home" })?),
            CommandKind::Move => {
                let x = RawValue::from_string(self.formatted_x())?;
                let y = RawValue::from_string(self.formatted_y())?;
                let msg = MoveMessage {
                    cmd: "move",
                    x: &x,
                    y: &y,
                    z: 0,
                };
                Ok(serde_json::to_string(&msg)?)
            }
        }
    }

    /// Operator-facing summary, e.g. `X: 2.00, Y: 10.00`.
    pub fn display_text(&self) -> String {
        match self.kind {
            CommandKind::Home => "Home".to_string(),
            CommandKind::Move => format!("X: {}, Y: {}", self.formatted_x(), self.formatted_y()),
        }
    }
}

/// Rounds half away from zero to two decimals. Negative zero is folded
/// into zero so it never renders as `-0.00`.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}
