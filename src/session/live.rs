use super::DeviceFactory;
use crate::capture::{CaptureSource, WebcamCapture};
use crate::config::SessionConfig;
use crate::output::{OutputSink, SnapshotOutput, V4L2Output};
use crate::segmentation::{self, SegmentationProvider};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Opens the real webcam, v4l2loopback device and ONNX model
#[derive(Debug, Default)]
pub struct LiveDevices {
    snapshot: Option<PathBuf>,
}

impl LiveDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write composited frames to a PNG instead of the virtual camera
    pub fn with_snapshot(path: PathBuf) -> Self {
        Self {
            snapshot: Some(path),
        }
    }
}

impl DeviceFactory for LiveDevices {
    fn open_capture(&mut self, config: &SessionConfig) -> Result<Box<dyn CaptureSource>> {
        let capture = WebcamCapture::new(config.input_device, config.width, config.height, config.fps)
            .context("Failed to initialize webcam capture")?;
        Ok(Box::new(capture))
    }

    fn open_sink(&mut self, config: &SessionConfig) -> Result<Box<dyn OutputSink>> {
        if let Some(path) = &self.snapshot {
            return Ok(Box::new(SnapshotOutput::new(path, config.width, config.height)));
        }

        let output = V4L2Output::new(
            &config.output_device,
            config.width,
            config.height,
            config.output_format,
        )
        .context("Failed to initialize v4l2loopback output")?;
        Ok(Box::new(output))
    }

    fn load_model(&mut self, config: &SessionConfig) -> Result<Box<dyn SegmentationProvider>> {
        segmentation::create_default_provider(&config.model, config.quality)
            .context("Failed to load segmentation model")
    }
}
