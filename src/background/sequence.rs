use super::FrameReader;
use crate::frame::{ChannelOrder, Frame};
use anyhow::{ensure, Context, Result};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Background frames held in memory, e.g. a decoded animated GIF
pub struct FrameSequence {
    frames: Vec<Frame>,
    position: usize,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            position: 0,
        }
    }

    /// Decode every frame of an animated GIF, APNG or WebP file
    pub fn decode_animation<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let open = || -> Result<BufReader<File>> {
            let file = File::open(path)
                .with_context(|| format!("Failed to open background {}", path.display()))?;
            Ok(BufReader::new(file))
        };

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let frames = match extension.as_str() {
            "gif" => GifDecoder::new(open()?)?.into_frames().collect_frames(),
            "png" | "apng" => PngDecoder::new(open()?)?.apng()?.into_frames().collect_frames(),
            "webp" => WebPDecoder::new(open()?)?.into_frames().collect_frames(),
            other => anyhow::bail!("no animation decoder for .{} files", other),
        }
        .with_context(|| format!("Failed to decode animation {}", path.display()))?;

        let frames: Vec<Frame> = frames
            .into_iter()
            .map(|frame| {
                let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
                Frame::new(rgb, ChannelOrder::Rgb)
            })
            .collect();
        ensure!(!frames.is_empty(), "{} contains no frames", path.display());

        tracing::debug!("Decoded {} background frames from {}", frames.len(), path.display());
        Ok(Self::new(frames))
    }
}

impl FrameReader for FrameSequence {
    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        ensure!(
            index < self.frame_count(),
            "frame {} is past the end of a {} frame background",
            index,
            self.frames.len()
        );
        self.position = index as usize;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, RgbaImage};

    #[test]
    fn reads_in_order_until_the_end() {
        let mut sequence = FrameSequence::new(vec![
            Frame::filled(2, 2, [1, 1, 1], ChannelOrder::Rgb),
            Frame::filled(2, 2, [2, 2, 2], ChannelOrder::Rgb),
        ]);
        assert_eq!(sequence.frame_count(), 2);
        assert!(sequence.read_frame().unwrap().is_some());
        assert!(sequence.read_frame().unwrap().is_some());
        assert!(sequence.read_frame().unwrap().is_none());

        sequence.seek(1).unwrap();
        let frame = sequence.read_frame().unwrap().unwrap();
        assert_eq!(frame.pixels().get_pixel(0, 0)[0], 2);
        assert!(sequence.seek(2).is_err());
    }

    #[test]
    fn decodes_an_animated_gif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.gif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            let frames = [[255u8, 0, 0, 255], [0, 0, 255, 255], [0, 255, 0, 255]]
                .into_iter()
                .map(|color| {
                    image::Frame::from_parts(
                        RgbaImage::from_pixel(6, 4, image::Rgba(color)),
                        0,
                        0,
                        Delay::from_numer_denom_ms(100, 1),
                    )
                });
            encoder.encode_frames(frames).unwrap();
        }

        let mut sequence = FrameSequence::decode_animation(&path).unwrap();
        assert_eq!(sequence.frame_count(), 3);

        let first = sequence.read_frame().unwrap().unwrap();
        assert_eq!(first.dimensions(), (6, 4));
        assert_eq!(first.order(), ChannelOrder::Rgb);
        let pixel = first.pixels().get_pixel(0, 0).0;
        assert!(pixel[0] > 200 && pixel[2] < 50);
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(FrameSequence::decode_animation(&path).is_err());
    }
}
