// File: src/sinks.rs
//
// Display sinks for camera frames.

use std::path::{Path, PathBuf};

use image::{ColorType, ImageFormat};
use tracing::debug;

use armlink_common::models::Frame;
use armlink_common::traits::FrameSink;
use crate::Error;

/// Writes each frame to a PNG file for an external viewer. The file is
/// replaced atomically so a reader never sees a partial image.
pub struct FileFrameSink {
    path: PathBuf,
    staging: PathBuf,
}

impl FileFrameSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        Self {
            path,
            staging: PathBuf::from(staging),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for FileFrameSink {
    fn present(&self, frame: &Frame) -> Result<(), Error> {
        image::save_buffer_with_format(
            &self.staging,
            &frame.rgba,
            frame.width,
            frame.height,
            ColorType::Rgba8,
            ImageFormat::Png,
        )?;
        std::fs::rename(&self.staging, &self.path)?;
        Ok(())
    }
}

/// Only logs frame arrivals; used when no display is attached.
#[derive(Default)]
pub struct LogFrameSink;

impl FrameSink for LogFrameSink {
    fn present(&self, frame: &Frame) -> Result<(), Error> {
        debug!(
            "[Camera] frame #{} {}x{} at {}",
            frame.sequence, frame.width, frame.height, frame.fetched_at
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_file_sink_replaces_image() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileFrameSink::new(dir.path().join("camera.png"));

        for (sequence, shade) in [(1u64, 40u8), (2, 220)] {
            let frame = Frame {
                width: 2,
                height: 1,
                rgba: vec![shade, shade, shade, 255, shade, shade, shade, 255],
                sequence,
                fetched_at: Utc::now(),
            };
            sink.present(&frame).unwrap();
        }

        let saved = image::open(sink.path()).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (2, 1));
        assert_eq!(saved.get_pixel(1, 0).0, [220, 220, 220, 255]);
        assert!(!dir.path().join("camera.png.partial").exists());
    }
}
