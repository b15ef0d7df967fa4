// File: armlink-core/src/test_utils/helpers.rs
//
// In-process stand-ins for the arm, the camera and the tracking input.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use image::{ImageBuffer, ImageFormat, Rgba};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;

use armlink_common::models::{ControllerSample, Frame};
use armlink_common::traits::{FrameSink, PoseSampler};
use crate::control::ControlLoop;
use crate::video::FrameFetcher;
use crate::Error;

/// What the arm reports after each command it receives.
pub const TELEMETRY_REPLY: &str = r#"{"stepper":12,"base":-3,"joint2":40,"claw":0}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kick {
    None,
    /// Send a close frame to every client.
    Close,
    /// Drop every TCP stream without a close handshake.
    Sever,
}

#[derive(Default)]
struct ActuatorShared {
    received: Mutex<Vec<String>>,
    accepted: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// A local WebSocket server that behaves like the arm firmware: it records
/// every text frame and answers with an encoder report.
pub struct TestActuator {
    pub url: String,
    shared: Arc<ActuatorShared>,
    kick: watch::Sender<(u64, Kick)>,
    accept_task: JoinHandle<()>,
}

impl TestActuator {
    pub async fn spawn() -> Result<Self, Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(ActuatorShared::default());
        let (kick, kick_rx) = watch::channel((0u64, Kick::None));

        let shared_accept = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(stream, shared_accept.clone(), kick_rx.clone()));
            }
        });

        Ok(Self {
            url: format!("ws://{addr}/ws"),
            shared,
            kick,
            accept_task,
        })
    }

    pub fn received(&self) -> Vec<String> {
        self.shared.received.lock().clone()
    }

    /// Handshakes completed so far.
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open sessions ever seen.
    pub fn max_active(&self) -> usize {
        self.shared.max_active.load(Ordering::SeqCst)
    }

    /// Closes every open session from the arm's side with a close frame.
    pub fn close_all(&self) {
        self.kick.send_modify(|(n, kind)| {
            *n += 1;
            *kind = Kick::Close;
        });
    }

    /// Drops every open session without a close handshake.
    pub fn sever_all(&self) {
        self.kick.send_modify(|(n, kind)| {
            *n += 1;
            *kind = Kick::Sever;
        });
    }

    /// Waits until at least `count` messages have arrived.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> Vec<String> {
        wait_until(timeout, || self.shared.received.lock().len() >= count).await;
        self.received()
    }
}

impl Drop for TestActuator {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.sever_all();
    }
}

async fn serve_client(
    stream: TcpStream,
    shared: Arc<ActuatorShared>,
    mut kick: watch::Receiver<(u64, Kick)>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let _ = kick.borrow_and_update();

    shared.accepted.fetch_add(1, Ordering::SeqCst);
    let now = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
    shared.max_active.fetch_max(now, Ordering::SeqCst);
    let mut counted = true;

    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(txt))) => {
                    shared.received.lock().push(txt.as_str().to_string());
                    let _ = ws.send(Message::text(TELEMETRY_REPLY)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    // Counted as gone before tungstenite acknowledges the close.
                    if counted {
                        shared.active.fetch_sub(1, Ordering::SeqCst);
                        counted = false;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            changed = kick.changed() => {
                if changed.is_err() {
                    break;
                }
                let (_, kind) = *kick.borrow_and_update();
                match kind {
                    Kick::Close => {
                        if counted {
                            shared.active.fetch_sub(1, Ordering::SeqCst);
                            counted = false;
                        }
                        let _ = ws.close(None).await;
                    }
                    Kick::Sever => break,
                    Kick::None => {}
                }
            }
        }
    }

    if counted {
        shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A `ws://` URL on a port with nothing listening.
pub fn unreachable_ws_url() -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap_or(9);
    format!("ws://127.0.0.1:{port}/ws")
}

/// Polls `cond` every few milliseconds until it holds or `timeout` passes.
/// Returns whether it held.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// PNG-encodes a solid `width`x`height` image.
pub fn png_fixture(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgba(rgba));
    let mut bytes = Vec::new();
    // Encoding into memory cannot fail for a well-formed buffer.
    let _ = img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png);
    bytes
}

/// Sampler fed by the test through a [`SampleFeed`]. Queued samples are
/// consumed one per tick; with the queue empty the last one repeats.
pub struct ScriptedSampler {
    queue: Arc<Mutex<VecDeque<ControllerSample>>>,
    last: Option<ControllerSample>,
}

#[derive(Clone)]
pub struct SampleFeed {
    queue: Arc<Mutex<VecDeque<ControllerSample>>>,
}

impl ScriptedSampler {
    pub fn new() -> (Self, SampleFeed) {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                queue: queue.clone(),
                last: None,
            },
            SampleFeed { queue },
        )
    }
}

impl SampleFeed {
    pub fn push(&self, sample: ControllerSample) {
        self.queue.lock().push_back(sample);
    }
}

impl PoseSampler for ScriptedSampler {
    fn sample(&mut self) -> Option<ControllerSample> {
        if let Some(next) = self.queue.lock().pop_front() {
            self.last = Some(next);
        }
        self.last
    }
}

/// Camera stand-in: serves queued responses in order, then repeats the
/// fallback.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    fallback: Result<Vec<u8>, String>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedFetcher {
    pub fn new(fallback: Result<Vec<u8>, String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, response: Result<Vec<u8>, String>) -> Self {
        self.script.lock().push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FrameFetcher for ScriptedFetcher {
    async fn fetch_frame(&self) -> Result<Vec<u8>, Error> {
        self.calls.lock().push(Instant::now());
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone()).map_err(Error::Fetch)
    }
}

/// Records the sequence numbers of presented frames.
#[derive(Default)]
pub struct RecordingSink {
    presented: Mutex<Vec<u64>>,
}

impl RecordingSink {
    pub fn presented(&self) -> Vec<u64> {
        self.presented.lock().clone()
    }
}

impl FrameSink for RecordingSink {
    fn present(&self, frame: &Frame) -> Result<(), Error> {
        self.presented.lock().push(frame.sequence);
        Ok(())
    }
}

/// Ticks `control` every few milliseconds until `cond` holds or `timeout`
/// passes. Tick errors are ignored, as `ControlLoop::run` does.
pub async fn tick_until<F>(control: &mut ControlLoop, timeout: Duration, mut cond: F) -> bool
where
    F: FnMut(&ControlLoop) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let _ = control.tick();
        if cond(control) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
