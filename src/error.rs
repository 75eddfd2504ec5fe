use thiserror::Error;

/// Failures a capture session can run into
///
/// Only `FrameRead` and `BackgroundExhausted` are transient: the loop reports
/// them and carries on with the next tick. Everything else ends the session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Missing or unusable settings, reported before the session starts
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The webcam, the virtual camera or the model could not be opened
    #[error("failed to open {device}: {source:#}")]
    DeviceOpen {
        device: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read from webcam: {0:#}")]
    FrameRead(#[source] anyhow::Error),

    #[error("background frame {index} could not be read")]
    BackgroundExhausted { index: u64 },

    #[error("segmentation failed: {0:#}")]
    ModelInference(#[source] anyhow::Error),

    #[error("failed to write to virtual camera: {0:#}")]
    SinkWrite(#[source] anyhow::Error),
}

impl SessionError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn device_open(device: &'static str, source: anyhow::Error) -> Self {
        Self::DeviceOpen { device, source }
    }

    /// Whether the loop keeps running after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::FrameRead(_) | SessionError::BackgroundExhausted { .. }
        )
    }
}
