// File: src/calibration.rs
//
// Calibration and reconnect orchestration, evaluated once per control tick.

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use armlink_common::models::{CalibrationRecord, CalibrationStatus, ControllerSample, Pose};
use crate::connection::ConnectionManager;
use crate::video::VideoPoller;

pub const DEFAULT_TRIGGER_THRESHOLD: f32 = 0.5;

/// Turns an analog value into press edges around a threshold.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    threshold: f32,
    pressed: bool,
}

impl EdgeDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            pressed: false,
        }
    }

    /// `true` only on the update where the value first exceeds the threshold.
    pub fn rising(&mut self, value: f32) -> bool {
        let now = value > self.threshold;
        let edge = now && !self.pressed;
        self.pressed = now;
        edge
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

/// Notable transitions, reported back to the control loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    CalibrationStarted { origin: Pose },
    Calibrated,
    CalibrationAborted { reason: String },
    ReconnectStarted,
    Reconnected,
    ReconnectFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    pub arm_url: String,
    pub trigger_threshold: f32,
    pub arm_length_padding: f64,
}

enum PendingConnect {
    Calibration(oneshot::Receiver<Result<(), String>>),
    Reconnect(oneshot::Receiver<Result<(), String>>),
}

/// Owns the calibration origin and status, and decides when to connect.
///
/// * trigger rising edge while `Uncalibrated`: capture the origin, go to
///   `Calibrating`, and connect in the background.
/// * connect succeeds: `Calibrated`, camera polling starts.
/// * connect fails: back to `Uncalibrated`, origin discarded.
/// * grip rising edge while `Calibrated` and the connection is not open:
///   reconnect with the same origin; camera polling restarts on success.
pub struct CalibrationStateMachine {
    settings: CalibrationSettings,
    status: watch::Sender<CalibrationStatus>,
    record: Option<CalibrationRecord>,
    trigger: EdgeDetector,
    grip: EdgeDetector,
    pending: Option<PendingConnect>,
    connect_task: Option<JoinHandle<()>>,
    connection: ConnectionManager,
    poller: VideoPoller,
}

impl CalibrationStateMachine {
    pub fn new(settings: CalibrationSettings, connection: ConnectionManager, poller: VideoPoller) -> Self {
        let (status, _) = watch::channel(CalibrationStatus::Uncalibrated);
        Self {
            trigger: EdgeDetector::new(settings.trigger_threshold),
            grip: EdgeDetector::new(settings.trigger_threshold),
            settings,
            status,
            record: None,
            pending: None,
            connect_task: None,
            connection,
            poller,
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<CalibrationStatus> {
        self.status.subscribe()
    }

    pub fn origin(&self) -> Option<Pose> {
        self.record.map(|r| r.origin)
    }

    pub fn record(&self) -> Option<CalibrationRecord> {
        self.record
    }

    pub fn is_connect_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn poller(&self) -> &VideoPoller {
        &self.poller
    }

    /// Stops camera polling; used on shutdown.
    pub fn stop_video(&mut self) {
        self.poller.stop();
    }

    /// Abandons an in-flight connect and waits for its task to wind down,
    /// so it cannot open a session afterwards.
    pub async fn cancel_pending(&mut self) {
        self.pending = None;
        if let Some(task) = self.connect_task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    /// Evaluates one tick of input. Never blocks: connects run on spawned
    /// tasks and their outcome is picked up on a later call.
    pub fn update(&mut self, sample: &ControllerSample) -> Vec<CalibrationEvent> {
        let mut events = Vec::new();
        self.poll_pending(&mut events);

        let trigger_edge = self.trigger.rising(sample.trigger);
        let grip_edge = self.grip.rising(sample.grip);

        if trigger_edge && self.status() == CalibrationStatus::Uncalibrated {
            let origin = self.begin_calibration(sample);
            events.push(CalibrationEvent::CalibrationStarted { origin });
        }

        if grip_edge
            && self.status() == CalibrationStatus::Calibrated
            && self.pending.is_none()
            && !self.connection.is_open()
        {
            info!("[Calibration] Grip pressed, reconnecting to arm");
            let rx = self.spawn_connect();
            self.pending = Some(PendingConnect::Reconnect(rx));
            events.push(CalibrationEvent::ReconnectStarted);
        }

        events
    }

    fn begin_calibration(&mut self, sample: &ControllerSample) -> Pose {
        let origin = sample.position;
        let arm_length = sample
            .head
            .map(|head| head.distance(&origin) + self.settings.arm_length_padding);

        self.record = Some(CalibrationRecord {
            origin,
            arm_length,
            captured_at: Utc::now(),
        });
        self.status.send_replace(CalibrationStatus::Calibrating);
        info!(
            "[Calibration] Origin captured at ({:.3}, {:.3}, {:.3}), arm length {:?}",
            origin.x, origin.y, origin.z, arm_length
        );

        let rx = self.spawn_connect();
        self.pending = Some(PendingConnect::Calibration(rx));
        origin
    }

    fn spawn_connect(&mut self) -> oneshot::Receiver<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        let connection = self.connection.clone();
        let url = self.settings.arm_url.clone();
        self.connect_task = Some(tokio::spawn(async move {
            let outcome = connection.connect(&url).await.map_err(|e| e.to_string());
            let _ = tx.send(outcome);
        }));
        rx
    }

    fn poll_pending(&mut self, events: &mut Vec<CalibrationEvent>) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match pending {
            PendingConnect::Calibration(mut rx) => match rx.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.pending = Some(PendingConnect::Calibration(rx));
                }
                Ok(Ok(())) => {
                    self.status.send_replace(CalibrationStatus::Calibrated);
                    self.poller.start(self.status.subscribe());
                    info!("[Calibration] Calibrated");
                    events.push(CalibrationEvent::Calibrated);
                }
                Ok(Err(reason)) => self.abort_calibration(reason, events),
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.abort_calibration("connect task ended without a result".into(), events)
                }
            },
            PendingConnect::Reconnect(mut rx) => match rx.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.pending = Some(PendingConnect::Reconnect(rx));
                }
                Ok(Ok(())) => {
                    self.poller.start(self.status.subscribe());
                    info!("[Calibration] Reconnected; camera restarted");
                    events.push(CalibrationEvent::Reconnected);
                }
                Ok(Err(reason)) => {
                    warn!("[Calibration] Reconnect failed: {}", reason);
                    events.push(CalibrationEvent::ReconnectFailed { reason });
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    events.push(CalibrationEvent::ReconnectFailed {
                        reason: "connect task ended without a result".into(),
                    });
                }
            },
        }
    }

    fn abort_calibration(&mut self, reason: String, events: &mut Vec<CalibrationEvent>) {
        warn!("[Calibration] Calibration aborted: {}", reason);
        self.record = None;
        self.status.send_replace(CalibrationStatus::Uncalibrated);
        events.push(CalibrationEvent::CalibrationAborted { reason });
    }
}
