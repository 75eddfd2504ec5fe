use crate::frame::{ChannelOrder, Frame, Mask};
use crate::hologram::HologramEffect;
use anyhow::{ensure, Result};
use rand::Rng;

/// Blends the person over the background and hands the result over in the sink's channel order
pub struct Compositor {
    sink_order: ChannelOrder,
    hologram: Option<HologramEffect>,
}

impl Compositor {
    pub fn new(sink_order: ChannelOrder, hologram: bool) -> Self {
        Self {
            sink_order,
            hologram: hologram.then(HologramEffect::new),
        }
    }

    pub fn hologram_enabled(&self) -> bool {
        self.hologram.is_some()
    }

    pub fn composite(&mut self, foreground: &Frame, background: &Frame, matte: &Mask) -> Result<Frame> {
        composite(
            foreground,
            background,
            matte,
            self.hologram.as_mut(),
            self.sink_order,
        )
    }
}

/// `out = fg * matte + bg * (1 - matte)` per channel, then converted to `output_order`.
///
/// When a hologram effect is given it replaces the foreground before blending; the
/// matte is used as is.
pub fn composite<R: Rng>(
    foreground: &Frame,
    background: &Frame,
    matte: &Mask,
    hologram: Option<&mut HologramEffect<R>>,
    output_order: ChannelOrder,
) -> Result<Frame> {
    let _span = tracing::debug_span!("composite").entered();

    ensure!(
        foreground.dimensions() == background.dimensions(),
        "background is {}x{} but the frame is {}x{}",
        background.width(),
        background.height(),
        foreground.width(),
        foreground.height()
    );
    ensure!(
        foreground.dimensions() == matte.dimensions(),
        "matte is {}x{} but the frame is {}x{}",
        matte.width(),
        matte.height(),
        foreground.width(),
        foreground.height()
    );

    let mut output = match hologram {
        Some(effect) => effect.apply(foreground),
        None => foreground.clone(),
    };
    let background = background.to_order(output.order());

    for ((pixel, bg), &alpha) in output
        .pixels_mut()
        .pixels_mut()
        .zip(background.pixels().pixels())
        .zip(matte.data())
    {
        let inverse = 1.0 - alpha;
        for c in 0..3 {
            pixel[c] = (pixel[c] as f32 * alpha + bg[c] as f32 * inverse) as u8;
        }
    }

    Ok(output.into_order(output_order))
}
