// File: src/input/json_lines.rs
//
// Pose input from newline-delimited JSON, e.g. a tracking bridge piping
// `{"x":0.02,"y":1.21,"z":0.31,"trigger":0.0,"grip":0.0}` per line.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use armlink_common::models::ControllerSample;
use armlink_common::traits::PoseSampler;
use crate::Error;

const SAMPLE_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Each tick jumps to the newest sample (live tracking).
    Latest,
    /// Each tick consumes one sample in order (recorded replay).
    Sequential,
}

/// Reads samples on a background task; `sample` never waits on I/O.
pub struct JsonLinesSampler {
    rx: mpsc::Receiver<ControllerSample>,
    mode: SampleMode,
    last: Option<ControllerSample>,
    closed: bool,
    reader_task: JoinHandle<()>,
}

impl JsonLinesSampler {
    pub fn spawn<R>(reader: R, mode: SampleMode) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SAMPLE_QUEUE);
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut line_no: u64 = 0;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        line_no += 1;
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ControllerSample>(trimmed) {
                            Ok(sample) => {
                                if tx.send(sample).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("[Input] Skipping line {}: {}", line_no, e),
                        }
                    }
                    Ok(None) => {
                        info!("[Input] Pose stream ended after {} line(s)", line_no);
                        break;
                    }
                    Err(e) => {
                        error!("[Input] Failed to read pose stream: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            rx,
            mode,
            last: None,
            closed: false,
            reader_task,
        }
    }

    pub fn stdin(mode: SampleMode) -> Self {
        Self::spawn(tokio::io::stdin(), mode)
    }

    pub async fn open(path: impl AsRef<Path>, mode: SampleMode) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            Error::Input(format!("cannot open pose file {}: {}", path.display(), e))
        })?;
        debug!("[Input] Reading poses from {}", path.display());
        Ok(Self::spawn(file, mode))
    }

    fn take_one(&mut self) -> Option<ControllerSample> {
        match self.rx.try_recv() {
            Ok(sample) => Some(sample),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }
}

impl PoseSampler for JsonLinesSampler {
    fn sample(&mut self) -> Option<ControllerSample> {
        match self.mode {
            SampleMode::Sequential => {
                if let Some(sample) = self.take_one() {
                    self.last = Some(sample);
                }
            }
            SampleMode::Latest => {
                while let Some(sample) = self.take_one() {
                    self.last = Some(sample);
                }
            }
        }
        self.last
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for JsonLinesSampler {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
