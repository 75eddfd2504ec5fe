use super::preprocess::Preprocessor;
use super::types::{ModelQuality, SegmentationProvider};
use crate::frame::{Frame, Mask};
use anyhow::{anyhow, ensure, Result};
use ndarray::{Array1, ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results; its
/// alpha output is used as the person probability.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Recurrent hidden states fed back in the next frame
    recurrent: [ArrayD<f32>; 4],

    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `quality` - Picks the inference resolution and downsample ratio
    pub fn new<P: AsRef<Path>>(model_path: P, quality: ModelQuality) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {} ({:?} quality)", path.display(), quality);

        let session = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {e}"))?
            .with_intra_threads(4)
            .map_err(|e| anyhow!("Failed to set intra threads: {e}"))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("Failed to load model from {}: {e}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let (width, height) = quality.input_size();

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            recurrent: initial_state(),
            downsample_ratio: quality.downsample_ratio(),
        })
    }
}

/// RVM accepts 1x1x1x1 zero tensors as the state of the first frame
fn initial_state() -> [ArrayD<f32>; 4] {
    std::array::from_fn(|_| ArrayD::zeros(IxDyn(&[1, 1, 1, 1])))
}

impl SegmentationProvider for RobustVideoMatting {
    fn predict(&mut self, frame: &Frame) -> Result<Mask> {
        let _span = tracing::debug_span!("rvm_predict").entered();

        let input_tensor = self.preprocessor.preprocess(frame);

        let tensor = |array: ArrayD<f32>| {
            Tensor::from_array(array).map_err(|e| anyhow!("Failed to build input tensor: {e}"))
        };
        let [r1, r2, r3, r4] = self.recurrent.clone();
        let inputs = ort::inputs![
            tensor(input_tensor.into_dyn())?,
            tensor(r1)?,
            tensor(r2)?,
            tensor(r3)?,
            tensor(r4)?,
            Tensor::from_array(Array1::from_vec(vec![self.downsample_ratio]))
                .map_err(|e| anyhow!("Failed to build ratio tensor: {e}"))?
        ];

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| anyhow!("Failed to run inference: {e}"))?;
        drop(_infer_span);

        // Outputs: fgr, pha, r1o, r2o, r3o, r4o
        ensure!(outputs.len() >= 6, "RVM returned {} outputs, expected 6", outputs.len());

        let extract = |index: usize| -> Result<ArrayD<f32>> {
            Ok(outputs[index]
                .try_extract_array::<f32>()
                .map_err(|e| anyhow!("Failed to extract output {index}: {e}"))?
                .to_owned())
        };

        let pha = extract(1)?;
        for (slot, state) in self.recurrent.iter_mut().zip(2..6) {
            *slot = extract(state)?;
        }

        // Matte shape: [1, 1, H, W]
        let shape = pha.shape().to_vec();
        ensure!(shape.len() == 4, "unexpected matte shape {:?}", shape);
        let (matte_height, matte_width) = (shape[2] as u32, shape[3] as u32);
        let matte_flat: Vec<f32> = pha.iter().copied().collect();

        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::postprocess_matte(
            matte_flat,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.recurrent = initial_state();
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
