// File: src/video/buffer.rs

use std::sync::Arc;
use parking_lot::RwLock;
use armlink_common::models::Frame;

/// Single-slot frame store shared between the poller (sole writer) and
/// readers. Each store replaces the previous frame.
#[derive(Clone, Default)]
pub struct FrameBuffer {
    latest: Arc<RwLock<Option<Frame>>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Frame> {
        self.latest.read().clone()
    }

    /// Sequence number of the stored frame, 0 when empty.
    pub fn sequence(&self) -> u64 {
        self.latest.read().as_ref().map(|f| f.sequence).unwrap_or(0)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.latest.read().as_ref().map(|f| (f.width, f.height))
    }

    pub(crate) fn store(&self, frame: Frame) {
        *self.latest.write() = Some(frame);
    }
}
