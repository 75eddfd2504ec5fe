mod v4l_capture;

pub use v4l_capture::{list_devices, WebcamCapture};

use crate::frame::Frame;
use anyhow::Result;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame at `resolution()`
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
