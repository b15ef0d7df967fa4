// File: armlink-common/src/models/frame.rs

use chrono::{DateTime, Utc};
use crate::Error;

/// A decoded camera frame (RGBA8).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Monotonic count of successful fetches; the first frame is 1.
    pub sequence: u64,
    pub fetched_at: DateTime<Utc>,
}

impl Frame {
    /// Decodes an encoded image (JPEG or PNG) into a frame.
    pub fn decode(bytes: &[u8], sequence: u64) -> Result<Frame, Error> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Frame {
            width,
            height,
            rgba: img.into_raw(),
            sequence,
            fetched_at: Utc::now(),
        })
    }
}
