use crate::frame::{Frame, Mask};
use anyhow::Result;

/// Trait for person segmentation models
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait SegmentationProvider {
    /// Person probability for every pixel of `frame`
    ///
    /// # Returns
    /// * Mask of the same size as the frame with values 0.0-1.0
    fn predict(&mut self, frame: &Frame) -> Result<Mask>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Starting a new capture session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Get the resolution frames are scaled to before inference
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

/// Trade-off between segmentation detail and inference time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ModelQuality {
    Low,
    #[default]
    Medium,
    High,
    Max,
}

impl ModelQuality {
    /// Inference resolution (16:9)
    pub fn input_size(self) -> (u32, u32) {
        match self {
            ModelQuality::Low => (256, 144),
            ModelQuality::Medium => (512, 288),
            ModelQuality::High => (768, 432),
            ModelQuality::Max => (1280, 720),
        }
    }

    /// Ratio the matting network downsamples its input by, keeping the
    /// internal resolution near 256 pixels wide
    pub fn downsample_ratio(self) -> f32 {
        let (width, _) = self.input_size();
        (256.0 / width as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_quality_means_larger_input() {
        let widths: Vec<u32> = [
            ModelQuality::Low,
            ModelQuality::Medium,
            ModelQuality::High,
            ModelQuality::Max,
        ]
        .iter()
        .map(|q| q.input_size().0)
        .collect();
        assert!(widths.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn downsample_ratio_is_bounded() {
        assert_eq!(ModelQuality::Low.downsample_ratio(), 1.0);
        assert_eq!(ModelQuality::Medium.downsample_ratio(), 0.5);
        assert!(ModelQuality::Max.downsample_ratio() > 0.0);
    }
}
