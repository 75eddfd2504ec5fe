use super::{OutputSink, PixelFormat};
use crate::frame::{ChannelOrder, Frame};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

pub struct V4L2Output {
    // keeps the negotiated format alive for the lifetime of the writer
    _device: Device,
    file: File,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(
        device_path: P,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{}, {:?})",
            path.display(),
            width,
            height,
            format
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        let mut fmt = Output::format(&device).context("Failed to query output format")?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = FourCC::new(format.fourcc());
        fmt.stride = format.bytes_per_line(width);
        fmt.size = fmt.stride * height;
        let negotiated = Output::set_format(&device, &fmt).context("Failed to set output format")?;
        let (width, height) = accepted_size(format, (width, height), &negotiated)?;

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            _device: device,
            file,
            width,
            height,
            format,
        })
    }

    /// Convert an RGB frame to YUV422 (YUYV): Y0 U Y1 V per pixel pair
    fn rgb_to_yuyv(frame: &Frame) -> Vec<u8> {
        let rgb = frame.pixels();
        let (width, height) = rgb.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = rgb.get_pixel(x, y);
                let pixel2 = if x + 1 < width {
                    rgb.get_pixel(x + 1, y)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // chroma is shared by the pair
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }

    fn encode(&self, frame: &Frame) -> Vec<u8> {
        match self.format {
            PixelFormat::Yuyv => Self::rgb_to_yuyv(frame),
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => frame.as_raw().to_vec(),
        }
    }
}

/// Frame size to write after the driver adjusted the requested format.
/// A different pixel format cannot be written at all.
fn accepted_size(
    format: PixelFormat,
    requested: (u32, u32),
    negotiated: &v4l::Format,
) -> Result<(u32, u32)> {
    let wanted = FourCC::new(format.fourcc());
    anyhow::ensure!(
        negotiated.fourcc == wanted,
        "device switched pixel format from {} to {}",
        wanted,
        negotiated.fourcc
    );

    let accepted = (negotiated.width, negotiated.height);
    if accepted != requested {
        tracing::warn!(
            "Device accepted {}x{} instead of {}x{}, frames will be scaled",
            accepted.0,
            accepted.1,
            requested.0,
            requested.1
        );
    }
    Ok(accepted)
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let frame = frame
            .to_order(self.channel_order())
            .resized(self.width, self.height);

        let data = self.encode(&frame);

        self.file
            .write_all(&data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn channel_order(&self) -> ChannelOrder {
        self.format.channel_order()
    }
}

impl Drop for V4L2Output {
    fn drop(&mut self) {
        tracing::info!("Closing v4l2loopback device");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv_of_grey_has_neutral_chroma() {
        let (y, u, v) = rgb_to_yuv(128, 128, 128);
        assert!((127..=128).contains(&y));
        assert!((127..=129).contains(&u));
        assert!((127..=129).contains(&v));
    }

    #[test]
    fn yuyv_packs_two_pixels_into_four_bytes() {
        let frame = Frame::filled(4, 2, [255, 255, 255], ChannelOrder::Rgb);
        let packed = V4L2Output::rgb_to_yuyv(&frame);
        assert_eq!(packed.len(), 4 * 2 * 2);
        assert!(packed[0] >= 254);
        assert_eq!(packed[0], packed[2]);
    }

    #[test]
    fn frames_follow_the_size_the_device_accepted() {
        let negotiated = v4l::Format::new(640, 480, FourCC::new(b"YUYV"));
        let size = accepted_size(PixelFormat::Yuyv, (1280, 720), &negotiated).unwrap();
        assert_eq!(size, (640, 480));
    }

    #[test]
    fn switched_pixel_format_is_rejected() {
        let negotiated = v4l::Format::new(1280, 720, FourCC::new(b"RGB3"));
        assert!(accepted_size(PixelFormat::Yuyv, (1280, 720), &negotiated).is_err());
    }

    #[test]
    fn bgr_sink_expects_bgr_frames() {
        assert_eq!(PixelFormat::Bgr24.channel_order(), ChannelOrder::Bgr);
        assert_eq!(PixelFormat::Yuyv.channel_order(), ChannelOrder::Rgb);
        assert_eq!(PixelFormat::Yuyv.bytes_per_line(640), 1280);
    }
}
