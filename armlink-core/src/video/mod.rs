// File: src/video/mod.rs
//
// Camera feedback: a periodic single-frame fetch loop that runs beside the
// control tick.

pub mod buffer;
pub mod fetcher;
pub mod poller;

pub use buffer::FrameBuffer;
pub use fetcher::{FrameFetcher, HttpFrameFetcher};
pub use poller::VideoPoller;
