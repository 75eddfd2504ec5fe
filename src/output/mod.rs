mod loopback;
mod snapshot;

pub use loopback::V4L2Output;
pub use snapshot::SnapshotOutput;

use crate::frame::{ChannelOrder, Frame};
use anyhow::Result;

/// Pixel layout written to the virtual camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PixelFormat {
    /// Packed 4:2:2 YUV, understood by most consumers of v4l2loopback
    Yuyv,
    Rgb24,
    Bgr24,
}

impl PixelFormat {
    pub fn fourcc(self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Rgb24 => b"RGB3",
            PixelFormat::Bgr24 => b"BGR3",
        }
    }

    /// Channel order frames must be in before they are handed to the sink
    pub fn channel_order(self) -> ChannelOrder {
        match self {
            PixelFormat::Yuyv | PixelFormat::Rgb24 => ChannelOrder::Rgb,
            PixelFormat::Bgr24 => ChannelOrder::Bgr,
        }
    }

    pub fn bytes_per_line(self, width: u32) -> u32 {
        match self {
            PixelFormat::Yuyv => width * 2,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => width * 3,
        }
    }
}

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);

    /// Channel order the sink expects frames in
    fn channel_order(&self) -> ChannelOrder;
}
