use super::OutputSink;
use crate::frame::{ChannelOrder, Frame};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Writes each frame it receives to an image file, replacing the previous one.
/// Used to check the pipeline without a virtual camera.
pub struct SnapshotOutput {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl SnapshotOutput {
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width,
            height,
        }
    }
}

impl OutputSink for SnapshotOutput {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let image = frame.resized(self.width, self.height).into_rgb();
        image
            .save(&self.path)
            .with_context(|| format!("Failed to save snapshot to {}", self.path.display()))?;
        tracing::info!("Snapshot written to {}", self.path.display());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }
}
