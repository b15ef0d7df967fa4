// File: armlink-common/src/models/config.rs

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::Error;

/// Runtime settings for one teleoperation controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    /// WebSocket endpoint of the arm's command channel.
    pub arm_url: String,
    /// HTTP endpoint returning a single camera frame.
    pub camera_url: String,
    pub tick_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub status_interval_ms: u64,
    /// Metres of controller travel to command units.
    pub command_gain: f64,
    pub trigger_threshold: f32,
    /// Added to the measured head-to-controller distance at calibration.
    pub arm_length_padding: f64,
    pub connect_timeout_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            arm_url: "ws://127.0.0.1/ws".to_string(),
            camera_url: "http://127.0.0.1/camera".to_string(),
            tick_interval_ms: 20,
            poll_interval_ms: 100,
            status_interval_ms: 1000,
            command_gain: 20.0,
            trigger_threshold: 0.5,
            arm_length_padding: 0.02,
            connect_timeout_ms: None,
            fetch_timeout_ms: None,
        }
    }
}

impl TeleopConfig {
    /// Loads a JSON config file; missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let cfg: TeleopConfig = serde_json::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let arm = Url::parse(&self.arm_url)?;
        if !matches!(arm.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "arm_url must use ws:// or wss://, got '{}'", self.arm_url
            )));
        }
        let camera = Url::parse(&self.camera_url)?;
        if !matches!(camera.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "camera_url must use http:// or https://, got '{}'", self.camera_url
            )));
        }
        if self.tick_interval_ms == 0 || self.poll_interval_ms == 0 || self.status_interval_ms == 0 {
            return Err(Error::Config("intervals must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.trigger_threshold) {
            return Err(Error::Config(format!(
                "trigger_threshold must be within [0, 1], got {}", self.trigger_threshold
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}
