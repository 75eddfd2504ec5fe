use super::FrameReader;
use crate::frame::{ChannelOrder, Frame};
use anyhow::{bail, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;

/// Background clip decoded frame by frame with FFmpeg
pub struct VideoFile {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    eof: bool,
}

impl VideoFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        ffmpeg::init().context("Failed to initialize FFmpeg")?;

        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("Failed to open video {}", path.display()))?;

        let (stream_index, frame_count, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .with_context(|| format!("No video stream in {}", path.display()))?;

            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .context("Failed to create codec context")?;
            let decoder = context
                .decoder()
                .video()
                .context("Failed to create video decoder")?;

            (stream.index(), declared_frames(&stream, input.duration()), decoder)
        };

        if frame_count == 0 {
            bail!("{} does not declare a frame count", path.display());
        }

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("Failed to create frame scaler")?;

        tracing::info!(
            "Opened background video {} ({}x{}, {} frames)",
            path.display(),
            decoder.width(),
            decoder.height(),
            frame_count
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            frame_count,
            eof: false,
        })
    }

    fn convert(&mut self, decoded: &ffmpeg::util::frame::video::Video) -> Result<Frame> {
        let mut rgb = ffmpeg::util::frame::video::Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .context("Failed to convert frame to RGB")?;

        let (width, height) = (rgb.width(), rgb.height());
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let row_bytes = width as usize * 3;

        let mut raw = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            raw.extend_from_slice(&data[start..start + row_bytes]);
        }

        let image = RgbImage::from_raw(width, height, raw)
            .context("Decoded frame has an unexpected size")?;
        Ok(Frame::new(image, ChannelOrder::Rgb))
    }
}

/// Frame count from the container, falling back to duration times frame rate
fn declared_frames(stream: &ffmpeg::format::stream::Stream, container_duration: i64) -> u64 {
    if stream.frames() > 0 {
        return stream.frames() as u64;
    }

    let seconds = if stream.duration() > 0 {
        stream.duration() as f64 * f64::from(stream.time_base())
    } else {
        container_duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    };
    let rate = f64::from(stream.avg_frame_rate());
    if seconds.is_finite() && rate.is_finite() && seconds > 0.0 && rate > 0.0 {
        (seconds * rate).floor() as u64
    } else {
        0
    }
}

impl FrameReader for VideoFile {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        self.input
            .seek(0, ..)
            .context("Failed to seek background video")?;
        self.decoder.flush();
        self.eof = false;

        for skipped in 0..index {
            if self.read_frame()?.is_none() {
                bail!("background video ended after {} of {} frames", skipped, index);
            }
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof {
                return Ok(None);
            }

            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == self.stream_index {
                        self.decoder
                            .send_packet(&packet)
                            .context("Failed to send packet to decoder")?;
                    }
                }
                None => {
                    self.decoder
                        .send_eof()
                        .context("Failed to flush decoder")?;
                    self.eof = true;
                }
            }
        }
    }
}
