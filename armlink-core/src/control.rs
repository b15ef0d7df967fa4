// File: src/control.rs

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use armlink_common::models::{
    CalibrationStatus, Command, ConnectionEvent, ConnectionState, StatusSnapshot, TeleopConfig,
};
use armlink_common::traits::{FrameSink, PoseSampler};
use crate::calibration::{CalibrationEvent, CalibrationSettings, CalibrationStateMachine};
use crate::connection::{ConnectionEvents, ConnectionManager};
use crate::encoder::CommandEncoder;
use crate::video::{FrameBuffer, FrameFetcher, HttpFrameFetcher, VideoPoller};
use crate::Error;

pub const STATUS_PRESS_TRIGGER: &str = "Press trigger to calibrate";
pub const STATUS_CALIBRATING: &str = "Calibrating...";
pub const STATUS_CALIBRATED: &str = "Calibrated! Move controller to move arm";
pub const STATUS_CONNECTED: &str = "Connected!";
pub const STATUS_CONNECT_FAILED: &str = "Connection failed\nPress grip to retry";
pub const STATUS_CALIBRATION_FAILED: &str = "Connection failed\nPress trigger to retry";
pub const STATUS_CONNECTION_LOST: &str = "Connection lost\nPress grip to reconnect";
pub const STATUS_RECONNECTING: &str = "Reconnecting...";

/// Operator-facing text owned by the control loop.
#[derive(Debug, Clone)]
struct LoopDetails {
    last_command: String,
    status_text: String,
}

/// Read-only handle for UI/status collaborators.
#[derive(Clone)]
pub struct StatusHandle {
    connection: ConnectionManager,
    calibration: watch::Receiver<CalibrationStatus>,
    details: Arc<RwLock<LoopDetails>>,
    frames: FrameBuffer,
}

impl StatusHandle {
    pub fn snapshot(&self) -> StatusSnapshot {
        let connection_state = self.connection.state();
        let calibration_status = *self.calibration.borrow();
        let details = self.details.read().clone();
        StatusSnapshot {
            is_connected: connection_state.is_open(),
            is_calibrated: calibration_status == CalibrationStatus::Calibrated,
            last_command: details.last_command,
            status_text: details.status_text,
            connection_state,
            calibration_status,
            telemetry: self.connection.telemetry(),
            frames_received: self.frames.sequence(),
        }
    }
}

/// Per-tick driver: samples input, advances calibration, and streams move
/// commands while calibrated and connected.
pub struct ControlLoop {
    sampler: Box<dyn PoseSampler>,
    calibration: CalibrationStateMachine,
    connection: ConnectionManager,
    events: ConnectionEvents,
    encoder: CommandEncoder,
    details: Arc<RwLock<LoopDetails>>,
    frames: FrameBuffer,
    tick_interval: std::time::Duration,
}

impl ControlLoop {
    pub fn new(
        config: &TeleopConfig,
        sampler: Box<dyn PoseSampler>,
        fetcher: Arc<dyn FrameFetcher>,
        sink: Option<Arc<dyn FrameSink>>,
    ) -> Self {
        let (connection, events) = ConnectionManager::new(config.connect_timeout());

        let mut poller = VideoPoller::new(fetcher, config.poll_interval());
        if let Some(sink) = sink {
            poller = poller.with_sink(sink);
        }
        let frames = poller.buffer();

        let settings = CalibrationSettings {
            arm_url: config.arm_url.clone(),
            trigger_threshold: config.trigger_threshold,
            arm_length_padding: config.arm_length_padding,
        };
        let calibration = CalibrationStateMachine::new(settings, connection.clone(), poller);

        Self {
            sampler,
            calibration,
            connection,
            events,
            encoder: CommandEncoder::new(config.command_gain),
            details: Arc::new(RwLock::new(LoopDetails {
                last_command: "None".to_string(),
                status_text: STATUS_PRESS_TRIGGER.to_string(),
            })),
            frames,
            tick_interval: config.tick_interval(),
        }
    }

    /// Builds a loop that fetches camera frames over HTTP from
    /// `config.camera_url`.
    pub fn from_config(
        config: &TeleopConfig,
        sampler: Box<dyn PoseSampler>,
        sink: Option<Arc<dyn FrameSink>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let fetcher = HttpFrameFetcher::new(config.camera_url.clone(), config.fetch_timeout())?;
        Ok(Self::new(config, sampler, Arc::new(fetcher), sink))
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            connection: self.connection.clone(),
            calibration: self.calibration.watch_status(),
            details: self.details.clone(),
            frames: self.frames.clone(),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn calibration(&self) -> &CalibrationStateMachine {
        &self.calibration
    }

    pub fn frames(&self) -> FrameBuffer {
        self.frames.clone()
    }

    /// Runs one control tick. Returns the move command sent this tick, if
    /// any.
    pub fn tick(&mut self) -> Result<Option<Command>, Error> {
        self.drain_connection_events();

        let Some(sample) = self.sampler.sample() else {
            return Ok(None);
        };

        for event in self.calibration.update(&sample) {
            self.on_calibration_event(event);
        }

        if self.calibration.status() != CalibrationStatus::Calibrated || !self.connection.is_open() {
            return Ok(None);
        }
        let Some(origin) = self.calibration.origin() else {
            return Ok(None);
        };

        let command = self.encoder.encode(origin, sample.position);
        self.connection.send(&command)?;

        let text = command.display_text();
        trace!("[ArmLink] Sent move {}", text);
        self.details.write().last_command = text;
        Ok(Some(command))
    }

    /// Ticks at the configured rate until `shutdown` resolves or the pose
    /// source closes, then stops the camera and closes the connection.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("[ArmLink] Control loop running every {:?}", self.tick_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[ArmLink] Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        warn!("[ArmLink] Tick failed: {}", e);
                    }
                    if self.sampler.is_closed() {
                        info!("[ArmLink] Pose input ended");
                        break;
                    }
                }
            }
        }

        self.shutdown().await
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.calibration.stop_video();
        self.calibration.cancel_pending().await;
        self.connection.close().await?;
        self.drain_connection_events();
        info!("[ArmLink] Control loop stopped");
        Ok(())
    }

    fn set_status_text(&self, text: &str) {
        self.details.write().status_text = text.to_string();
    }

    fn drain_connection_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ConnectionEvent::Opened { url } => {
                    info!("[ArmLink] Connected to arm at {}", url);
                    self.set_status_text(STATUS_CONNECTED);
                }
                ConnectionEvent::Error { message } => {
                    warn!("[ArmLink] Connection error: {}", message);
                    // A failed first connect is reported as a calibration abort.
                    if self.calibration.status() == CalibrationStatus::Calibrated {
                        self.set_status_text(STATUS_CONNECT_FAILED);
                    }
                }
                ConnectionEvent::Closed { reason, requested } => {
                    info!("[ArmLink] Connection closed (requested={}, reason={:?})", requested, reason);
                    if !requested
                        && self.connection.state() == ConnectionState::Disconnected
                        && self.calibration.status() == CalibrationStatus::Calibrated
                    {
                        self.set_status_text(STATUS_CONNECTION_LOST);
                    }
                }
            }
        }
    }

    fn on_calibration_event(&mut self, event: CalibrationEvent) {
        debug!("[Calibration] {:?}", event);
        match event {
            CalibrationEvent::CalibrationStarted { .. } => self.set_status_text(STATUS_CALIBRATING),
            CalibrationEvent::Calibrated => self.set_status_text(STATUS_CALIBRATED),
            CalibrationEvent::CalibrationAborted { .. } => self.set_status_text(STATUS_CALIBRATION_FAILED),
            CalibrationEvent::ReconnectStarted => self.set_status_text(STATUS_RECONNECTING),
            CalibrationEvent::Reconnected => self.set_status_text(STATUS_CONNECTED),
            CalibrationEvent::ReconnectFailed { .. } => self.set_status_text(STATUS_CONNECT_FAILED),
        }
    }
}
