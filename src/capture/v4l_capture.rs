use super::CaptureSource;
use crate::frame::{ChannelOrder, Frame};
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{} @ {} fps",
            device_index,
            width,
            height,
            fps
        );

        let index = CameraIndex::Index(device_index);
        let wanted = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.camera_format();
        tracing::info!(
            "Webcam streaming {}x{} @ {} fps",
            actual.width(),
            actual.height(),
            actual.frame_rate()
        );

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let (width, height) = (decoded.width(), decoded.height());
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .context("Decoded frame has an unexpected size")?;

        // cameras may not honour the requested resolution
        Ok(Frame::new(image, ChannelOrder::Rgb).resized(self.width, self.height))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        tracing::info!("Releasing webcam");
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Human readable names of the cameras nokhwa can see, with their indices
pub fn list_devices() -> Result<Vec<(u32, String)>> {
    let cameras = nokhwa::query(ApiBackend::Auto).context("Failed to enumerate cameras")?;
    Ok(cameras
        .iter()
        .enumerate()
        .map(|(idx, info)| {
            let index = match info.index() {
                CameraIndex::Index(i) => *i,
                CameraIndex::String(_) => idx as u32,
            };
            (index, info.human_name())
        })
        .collect())
}
