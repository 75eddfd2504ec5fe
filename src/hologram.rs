//! Blue scanline "hologram" look applied to the person before compositing.

use crate::frame::Frame;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rows in each dimmed scanline band
pub const BAND_LENGTH: u32 = 2;

/// Full intensity rows between two bands
pub const BAND_GAP: u32 = 3;

const BAND_DIMMING: std::ops::Range<f32> = 0.1..0.3;

/// Diagonal pixel offset of the two echoes
const ECHO_OFFSET: i64 = 5;

const FIRST_ECHO_WEIGHTS: (f32, f32) = (0.2, 0.8);
const SECOND_ECHO_WEIGHTS: (f32, f32) = (0.5, 0.6);
const OVERLAY_WEIGHTS: (f32, f32) = (0.5, 0.6);

/// Stateful only through its random source, which decides the per band flicker.
pub struct HologramEffect<R = StdRng> {
    rng: R,
}

impl HologramEffect<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Reproducible flicker, mostly for tests
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for HologramEffect<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> HologramEffect<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn apply(&mut self, frame: &Frame) -> Frame {
        let _span = tracing::debug_span!("hologram").entered();

        let mut banded = tint(frame);
        self.dim_bands(&mut banded);

        let echo = add_weighted(
            &banded,
            FIRST_ECHO_WEIGHTS.0,
            &shift(&banded, ECHO_OFFSET, ECHO_OFFSET),
            FIRST_ECHO_WEIGHTS.1,
        );
        let echo = add_weighted(
            &echo,
            SECOND_ECHO_WEIGHTS.0,
            &shift(&echo, -ECHO_OFFSET, -ECHO_OFFSET),
            SECOND_ECHO_WEIGHTS.1,
        );

        let pixels = add_weighted(frame.pixels(), OVERLAY_WEIGHTS.0, &echo, OVERLAY_WEIGHTS.1);
        Frame::new(pixels, frame.order())
    }

    /// Scale every band of `BAND_LENGTH` rows by its own random factor
    fn dim_bands(&mut self, image: &mut RgbImage) {
        let period = BAND_LENGTH + BAND_GAP;
        let mut factor = 1.0;
        for (y, row) in image.enumerate_rows_mut() {
            let phase = y % period;
            if phase == 0 {
                factor = self.rng.random_range(BAND_DIMMING);
            }
            if phase < BAND_LENGTH {
                for (_, _, pixel) in row {
                    for channel in pixel.0.iter_mut() {
                        *channel = (*channel as f32 * factor) as u8;
                    }
                }
            }
        }
    }
}

/// Map luma through a blue to green "winter" palette, scaled by the luma itself
/// so dark pixels stay dark.
fn tint(frame: &Frame) -> RgbImage {
    let order = frame.order();
    let (width, height) = frame.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let l = frame.luma(x, y) as f32;
        let t = l / 255.0;
        let mut pixel = image::Rgb([0u8; 3]);
        pixel[1] = (t * l).round() as u8;
        pixel[order.blue()] = ((1.0 - 0.5 * t) * l).round() as u8;
        pixel
    })
}

/// Move the picture by (dx, dy), filling the uncovered area with black
fn shift(image: &RgbImage, dx: i64, dy: i64) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = x as i64 - dx;
        let sy = y as i64 - dy;
        if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
            image::Rgb([0, 0, 0])
        } else {
            *image.get_pixel(sx as u32, sy as u32)
        }
    })
}

/// `a * alpha + b * beta`, rounded and saturated per channel
fn add_weighted(a: &RgbImage, alpha: f32, b: &RgbImage, beta: f32) -> RgbImage {
    let mut out = a.clone();
    for (dst, (pa, pb)) in out.pixels_mut().zip(a.pixels().zip(b.pixels())) {
        for c in 0..3 {
            let value = pa[c] as f32 * alpha + pb[c] as f32 * beta;
            dst[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
