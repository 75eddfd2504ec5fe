//! Backgrounds placed behind the person: a still image or a looping clip.

mod sequence;
#[cfg(feature = "video")]
mod video;

pub use sequence::FrameSequence;
#[cfg(feature = "video")]
pub use video::VideoFile;

use crate::config::BackgroundConfig;
use crate::error::SessionError;
use crate::frame::{ChannelOrder, Frame};
use anyhow::{ensure, Context, Result};
use std::path::Path;

/// Frame index a looping background restarts from after its last frame
pub const WRAP_TARGET: u64 = 0;

/// Frame-addressable source of background frames
pub trait FrameReader {
    /// Number of frames the source declares
    fn frame_count(&self) -> u64;

    /// Position the reader so the next `read_frame` returns frame `index`
    fn seek(&mut self, index: u64) -> Result<()>;

    /// Next frame, or `None` when the source has nothing more to give
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Position inside a looping background. Always in `0..total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundCursor {
    index: u64,
    total: u64,
}

impl BackgroundCursor {
    pub fn new(total: u64) -> Result<Self> {
        ensure!(total > WRAP_TARGET, "background has only {} frame(s)", total);
        Ok(Self { index: 0, total })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Step past the current frame. Returns true when the cursor wrapped.
    pub fn advance(&mut self) -> bool {
        self.index += 1;
        if self.index >= self.total {
            self.index = WRAP_TARGET;
            true
        } else {
            false
        }
    }

    pub fn rewind(&mut self) {
        self.index = WRAP_TARGET;
    }
}

struct StaticBackground {
    image: Frame,
    scaled: Option<Frame>,
}

struct AnimatedBackground {
    reader: Box<dyn FrameReader>,
    cursor: BackgroundCursor,
}

/// Supplies one background frame per tick at the output resolution
pub struct BackgroundSource {
    kind: BackgroundKind,
    width: u32,
    height: u32,
}

enum BackgroundKind {
    Static(StaticBackground),
    Animated(AnimatedBackground),
}

impl BackgroundSource {
    /// Open the configured background for an output of `width`x`height`
    pub fn open(config: &BackgroundConfig, width: u32, height: u32) -> Result<Self> {
        let path = config.path.as_path();
        tracing::info!(
            "Loading {} background {}",
            if config.animated { "animated" } else { "static" },
            path.display()
        );

        if config.animated {
            let reader = open_reader(path)?;
            Self::animated(reader, width, height)
        } else {
            let image = image::open(path)
                .with_context(|| format!("Failed to load background image {}", path.display()))?
                .to_rgb8();
            Ok(Self::still(Frame::new(image, ChannelOrder::Rgb), width, height))
        }
    }

    pub fn still(image: Frame, width: u32, height: u32) -> Self {
        Self {
            kind: BackgroundKind::Static(StaticBackground {
                image,
                scaled: None,
            }),
            width,
            height,
        }
    }

    pub fn animated(reader: Box<dyn FrameReader>, width: u32, height: u32) -> Result<Self> {
        let cursor = BackgroundCursor::new(reader.frame_count())?;
        tracing::info!("Background loops over {} frames", cursor.total());
        Ok(Self {
            kind: BackgroundKind::Animated(AnimatedBackground { reader, cursor }),
            width,
            height,
        })
    }

    /// Cursor of an animated background, `None` for a still
    pub fn cursor(&self) -> Option<BackgroundCursor> {
        match &self.kind {
            BackgroundKind::Static(_) => None,
            BackgroundKind::Animated(animated) => Some(animated.cursor),
        }
    }

    pub fn next_frame(&mut self) -> Result<Frame, SessionError> {
        let (width, height) = (self.width, self.height);
        match &mut self.kind {
            BackgroundKind::Static(StaticBackground { image, scaled }) => {
                let scaled = scaled.get_or_insert_with(|| image.resized(width, height));
                Ok(scaled.clone())
            }
            BackgroundKind::Animated(animated) => animated.next_frame(width, height),
        }
    }
}

impl AnimatedBackground {
    fn next_frame(&mut self, width: u32, height: u32) -> Result<Frame, SessionError> {
        let index = self.cursor.index();

        let frame = match self.reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::warn!("Background ended early at frame {}", index);
                self.restart();
                return Err(SessionError::BackgroundExhausted { index });
            }
            Err(e) => {
                tracing::warn!("Background frame {} ignored: {:#}", index, e);
                self.restart();
                return Err(SessionError::BackgroundExhausted { index });
            }
        };

        if self.cursor.advance() {
            tracing::debug!("Background wrapped after {} frames", self.cursor.total());
            if let Err(e) = self.reader.seek(self.cursor.index()) {
                tracing::warn!("Failed to rewind background: {:#}", e);
            }
        }

        Ok(frame.resized(width, height))
    }

    fn restart(&mut self) {
        self.cursor.rewind();
        if let Err(e) = self.reader.seek(self.cursor.index()) {
            tracing::warn!("Failed to rewind background: {:#}", e);
        }
    }
}

fn open_reader(path: &Path) -> Result<Box<dyn FrameReader>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "gif" | "png" | "apng" | "webp" => Ok(Box::new(FrameSequence::decode_animation(path)?)),
        #[cfg(feature = "video")]
        _ => Ok(Box::new(VideoFile::open(path)?)),
        #[cfg(not(feature = "video"))]
        _ => anyhow::bail!(
            "{} is not an animated image; video backgrounds need the `video` feature",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn numbered(count: u8) -> FrameSequence {
        FrameSequence::new(
            (0..count)
                .map(|i| Frame::filled(4, 4, [i, i, i], ChannelOrder::Rgb))
                .collect(),
        )
    }

    #[test]
    fn cursor_wraps_after_total_frames() {
        let mut cursor = BackgroundCursor::new(5).unwrap();
        let wrapped: Vec<bool> = (0..5).map(|_| cursor.advance()).collect();
        assert_eq!(wrapped, [false, false, false, false, true]);
        assert_eq!(cursor.index(), WRAP_TARGET);
        assert!((0..cursor.total()).contains(&cursor.index()));
    }

    #[test]
    fn cursor_needs_frames() {
        assert!(BackgroundCursor::new(0).is_err());
        assert!(BackgroundCursor::new(1).is_ok());
    }

    #[test]
    fn animated_background_loops() {
        let mut source = BackgroundSource::animated(Box::new(numbered(3)), 4, 4).unwrap();

        let values: Vec<u8> = (0..7)
            .map(|_| source.next_frame().unwrap().pixels().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, [0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(source.cursor().unwrap().index(), 1);
    }

    #[test]
    fn frames_are_scaled_to_the_output() {
        let mut source = BackgroundSource::animated(Box::new(numbered(2)), 16, 9).unwrap();
        assert_eq!(source.next_frame().unwrap().dimensions(), (16, 9));

        let still = Frame::filled(3, 3, [1, 2, 3], ChannelOrder::Rgb);
        let mut source = BackgroundSource::still(still, 8, 6);
        assert_eq!(source.next_frame().unwrap().dimensions(), (8, 6));
    }

    #[test]
    fn static_background_is_bit_identical() {
        let image = image::RgbImage::from_fn(17, 11, |x, y| image::Rgb([x as u8 * 9, y as u8 * 20, 7]));
        let mut source = BackgroundSource::still(Frame::new(image, ChannelOrder::Rgb), 32, 18);

        let first = source.next_frame().unwrap();
        for _ in 0..5 {
            assert_eq!(source.next_frame().unwrap(), first);
        }
        assert!(source.cursor().is_none());
    }

    /// Declares more frames than it can deliver
    struct ShortReader {
        inner: FrameSequence,
        declared: u64,
        seeks: Rc<Cell<u32>>,
    }

    impl FrameReader for ShortReader {
        fn frame_count(&self) -> u64 {
            self.declared
        }

        fn seek(&mut self, index: u64) -> Result<()> {
            self.seeks.set(self.seeks.get() + 1);
            self.inner.seek(index)
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            self.inner.read_frame()
        }
    }

    #[test]
    fn failed_read_reports_exhaustion_and_recovers() {
        let seeks = Rc::new(Cell::new(0));
        let reader = ShortReader {
            inner: numbered(2),
            declared: 4,
            seeks: seeks.clone(),
        };
        let mut source = BackgroundSource::animated(Box::new(reader), 4, 4).unwrap();

        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_ok());
        let err = source.next_frame().unwrap_err();
        assert!(matches!(err, SessionError::BackgroundExhausted { index: 2 }));
        assert_eq!(seeks.get(), 1);
        assert_eq!(source.cursor().unwrap().index(), WRAP_TARGET);

        let again = source.next_frame().unwrap();
        assert_eq!(again.pixels().get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn open_loads_a_still_image_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beach.png");
        image::RgbImage::from_pixel(5, 5, image::Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();

        let config = BackgroundConfig {
            path,
            animated: false,
        };
        let mut source = BackgroundSource::open(&config, 10, 10).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.dimensions(), (10, 10));
        assert_eq!(frame.pixels().get_pixel(5, 5).0, [10, 200, 30]);
    }

    #[test]
    fn unreadable_background_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let config = BackgroundConfig {
            path,
            animated: false,
        };
        assert!(BackgroundSource::open(&config, 10, 10).is_err());
    }
}
