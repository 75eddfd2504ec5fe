use crate::frame::{ChannelOrder, Frame, Mask};
use anyhow::{ensure, Context, Result};
use image::{imageops, ImageBuffer, Luma};
use ndarray::Array4;

/// Converts camera frames to model input tensors and model output back to masks
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess a frame into a normalized RGB NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format, RGB channel order whatever the frame's order
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, frame: &Frame) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = frame
            .resized(self.target_width, self.target_height)
            .into_order(ChannelOrder::Rgb);

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.pixels().enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }

    /// Scale a model output matte back to the frame size
    ///
    /// # Arguments
    /// * `matte` - Flattened matte at model resolution, row-major
    /// * `matte_width` - Width of the matte
    /// * `matte_height` - Height of the matte
    /// * `target_width` - Desired output width
    /// * `target_height` - Desired output height
    pub fn postprocess_matte(
        matte: Vec<f32>,
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Mask> {
        let _span = tracing::debug_span!("postprocess").entered();

        ensure!(
            matte.len() == (matte_width * matte_height) as usize,
            "model produced {} values for a {}x{} matte",
            matte.len(),
            matte_width,
            matte_height
        );

        if matte_width == target_width && matte_height == target_height {
            let clamped = matte.into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
            return Mask::from_vec(target_width, target_height, clamped);
        }

        let small: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(matte_width, matte_height, matte)
                .context("matte buffer does not match its size")?;

        let resized = imageops::resize(
            &small,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        let values = resized
            .into_raw()
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0))
            .collect();
        Mask::from_vec(target_width, target_height, values)
    }
}
