use crate::error::SessionError;
use crate::matte::DEFAULT_THRESHOLD;
use crate::output::PixelFormat;
use crate::segmentation::ModelQuality;
use std::path::PathBuf;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FPS: u32 = 20;
pub const DEFAULT_OUTPUT_DEVICE: &str = "/dev/video10";
pub const DEFAULT_MODEL: &str = "rvm_mobilenetv3_fp32.onnx";

/// Picture shown behind the person
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundConfig {
    pub path: PathBuf,
    /// Loop through the frames of a video or animated image instead of showing a still
    pub animated: bool,
}

/// Settings collected by the front end, possibly incomplete
#[derive(Debug, Clone)]
pub struct Configuration {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub flip: bool,
    pub hologram: bool,
    pub background: Option<BackgroundConfig>,
    pub input_device: u32,
    pub output_device: PathBuf,
    pub output_format: PixelFormat,
    pub model: PathBuf,
    pub quality: ModelQuality,
    pub threshold: f32,
    pub show_matte: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            flip: false,
            hologram: false,
            background: None,
            input_device: 0,
            output_device: PathBuf::from(DEFAULT_OUTPUT_DEVICE),
            output_format: PixelFormat::Yuyv,
            model: PathBuf::from(DEFAULT_MODEL),
            quality: ModelQuality::Medium,
            threshold: DEFAULT_THRESHOLD,
            show_matte: false,
        }
    }
}

/// Checked settings for one session. Never changes while the session runs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub flip: bool,
    pub hologram: bool,
    pub background: BackgroundConfig,
    pub input_device: u32,
    pub output_device: PathBuf,
    pub output_format: PixelFormat,
    pub model: PathBuf,
    pub quality: ModelQuality,
    pub threshold: f32,
    pub show_matte: bool,
}

impl Configuration {
    pub fn validate(self) -> Result<SessionConfig, SessionError> {
        if self.width == 0 || self.height == 0 {
            return Err(SessionError::configuration(format!(
                "resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(SessionError::configuration("framerate must be at least 1"));
        }
        if self.output_format == PixelFormat::Yuyv && self.width % 2 != 0 {
            return Err(SessionError::configuration(format!(
                "YUYV output needs an even width, got {}",
                self.width
            )));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(SessionError::configuration(format!(
                "threshold {} is outside (0, 1)",
                self.threshold
            )));
        }

        let background = self
            .background
            .ok_or_else(|| SessionError::configuration("please select a background"))?;
        if !background.path.is_file() {
            return Err(SessionError::configuration(format!(
                "background {} does not exist",
                background.path.display()
            )));
        }

        Ok(SessionConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
            flip: self.flip,
            hologram: self.hologram,
            background,
            input_device: self.input_device,
            output_device: self.output_device,
            output_format: self.output_format,
            model: self.model,
            quality: self.quality,
            threshold: self.threshold,
            show_matte: self.show_matte,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_background(path: PathBuf) -> Configuration {
        Configuration {
            background: Some(BackgroundConfig {
                path,
                animated: false,
            }),
            ..Configuration::default()
        }
    }

    #[test]
    fn defaults_match_the_front_end() {
        let config = Configuration::default();
        assert_eq!((config.width, config.height, config.fps), (1280, 720, 20));
        assert!(!config.flip && !config.hologram);
        assert_eq!(config.threshold, 0.7);
    }

    #[test]
    fn missing_background_is_a_configuration_error() {
        let err = Configuration::default().validate().unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn background_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = with_background(dir.path().join("missing.png"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn odd_width_is_rejected_for_yuyv_only() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut config = with_background(file.path().to_path_buf());
        config.width = 641;
        assert!(config.clone().validate().is_err());

        config.output_format = PixelFormat::Rgb24;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn valid_configuration_keeps_its_values() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = with_background(file.path().to_path_buf());
        config.flip = true;
        config.fps = 30;

        let session = config.validate().unwrap();
        assert!(session.flip);
        assert_eq!(session.fps, 30);
        assert_eq!(session.background.path, file.path());
    }

    #[test]
    fn zero_framerate_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = with_background(file.path().to_path_buf());
        config.fps = 0;
        assert!(matches!(
            config.validate(),
            Err(SessionError::Configuration(_))
        ));
    }
}
