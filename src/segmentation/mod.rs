mod preprocess;
mod rvm;
pub mod types;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{ModelQuality, SegmentationProvider};

use anyhow::Result;
use std::path::Path;

/// Create the default segmentation provider (RVM)
pub fn create_default_provider(
    model_path: &Path,
    quality: ModelQuality,
) -> Result<Box<dyn SegmentationProvider>> {
    let model = RobustVideoMatting::new(model_path, quality)?;
    Ok(Box::new(model))
}
