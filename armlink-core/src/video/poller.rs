// File: src/video/poller.rs

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use armlink_common::models::{CalibrationStatus, Frame};
use armlink_common::traits::FrameSink;
use super::{FrameBuffer, FrameFetcher};
use crate::Error;

/// Default pause between fetches (10 frames per second).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Periodically fetches a camera frame while the controller is calibrated.
///
/// At most one poll loop runs per poller: `start` cancels the previous loop
/// before spawning a new one. The loop also exits on its own as soon as it
/// sees, at the top of an iteration, that the status is no longer
/// `Calibrated`.
pub struct VideoPoller {
    fetcher: Arc<dyn FrameFetcher>,
    sink: Option<Arc<dyn FrameSink>>,
    buffer: FrameBuffer,
    interval: Duration,
    worker: Option<Worker>,
    starts: u64,
    stats: Arc<PollStats>,
}

struct Worker {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollStats {
    fetches: AtomicU64,
    failures: AtomicU64,
    live_loops: AtomicUsize,
}

/// Decrements the live-loop count however the loop ends, including abort.
struct LiveLoop(Arc<PollStats>);

impl LiveLoop {
    fn enter(stats: Arc<PollStats>) -> Self {
        stats.live_loops.fetch_add(1, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for LiveLoop {
    fn drop(&mut self) {
        self.0.live_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

impl VideoPoller {
    pub fn new(fetcher: Arc<dyn FrameFetcher>, interval: Duration) -> Self {
        Self {
            fetcher,
            sink: None,
            buffer: FrameBuffer::new(),
            interval,
            worker: None,
            starts: 0,
            stats: Arc::new(PollStats::default()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_buffer(mut self, buffer: FrameBuffer) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn buffer(&self) -> FrameBuffer {
        self.buffer.clone()
    }

    /// Starts a poll loop gated on `status`, stopping any running one first.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, status: watch::Receiver<CalibrationStatus>) {
        self.stop();
        self.starts += 1;

        let generation = self.starts;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            generation,
            self.fetcher.clone(),
            self.sink.clone(),
            self.buffer.clone(),
            self.interval,
            status,
            cancel.clone(),
            self.stats.clone(),
        ));

        info!("[Camera] Poll loop #{} started ({:?} interval)", generation, self.interval);
        self.worker = Some(Worker {
            generation,
            cancel,
            handle,
        });
    }

    /// Cancels the running loop, if any. A fetch in flight is abandoned.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            worker.handle.abort();
            debug!("[Camera] Poll loop #{} stopped", worker.generation);
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// How many times `start` has been called.
    pub fn start_count(&self) -> u64 {
        self.starts
    }

    /// Poll loops currently alive; never more than one once a stopped loop
    /// has been torn down.
    pub fn live_loops(&self) -> usize {
        self.stats.live_loops.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> u64 {
        self.stats.fetches.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u64 {
        self.stats.failures.load(Ordering::SeqCst)
    }
}

impl Drop for VideoPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_loop(
    generation: u64,
    fetcher: Arc<dyn FrameFetcher>,
    sink: Option<Arc<dyn FrameSink>>,
    buffer: FrameBuffer,
    interval: Duration,
    status: watch::Receiver<CalibrationStatus>,
    cancel: CancellationToken,
    stats: Arc<PollStats>,
) {
    let _live = LiveLoop::enter(stats.clone());

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let current = *status.borrow();
        if current != CalibrationStatus::Calibrated {
            debug!("[Camera] Poll loop #{} sees status {}, exiting", generation, current);
            break;
        }

        stats.fetches.fetch_add(1, Ordering::SeqCst);
        match fetcher.fetch_frame().await {
            Ok(bytes) => match decode_and_present(bytes, buffer.sequence() + 1, sink.clone()).await {
                Ok(frame) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    buffer.store(frame);
                }
                Err(e) => {
                    stats.failures.fetch_add(1, Ordering::SeqCst);
                    error!("[Camera] Failed to decode frame: {}", e);
                }
            },
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::SeqCst);
                error!("[Camera] Camera stream error: {}", e);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    info!("[Camera] Poll loop #{} ended", generation);
}

/// Decoding and the sink may both be slow (PNG encode, file I/O), so they
/// run on the blocking pool rather than a runtime worker.
async fn decode_and_present(
    bytes: Vec<u8>,
    sequence: u64,
    sink: Option<Arc<dyn FrameSink>>,
) -> Result<Frame, Error> {
    tokio::task::spawn_blocking(move || {
        let frame = Frame::decode(&bytes, sequence)?;
        if let Some(sink) = sink {
            if let Err(e) = sink.present(&frame) {
                warn!("[Camera] Display sink rejected frame {}: {}", frame.sequence, e);
            }
        }
        Ok(frame)
    })
    .await
    .map_err(|e| Error::Fetch(format!("frame worker failed: {e}")))?
}
