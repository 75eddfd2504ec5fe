use super::{CancellationToken, DeviceFactory, SessionEvent, SessionState, SharedState};
use crate::background::BackgroundSource;
use crate::capture::CaptureSource;
use crate::compositor::Compositor;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::frame::Frame;
use crate::matte::MaskRefiner;
use crate::output::OutputSink;
use crate::segmentation::SegmentationProvider;
use crossbeam_channel::Sender;
use std::time::{Duration, Instant};

/// Every handle one session needs, plus the last frame handed to the sink
pub struct Pipeline {
    capture: Box<dyn CaptureSource>,
    output: Box<dyn OutputSink>,
    model: Box<dyn SegmentationProvider>,
    background: BackgroundSource,
    refiner: MaskRefiner,
    compositor: Compositor,
    flip: bool,
    show_matte: bool,
    last_output: Option<Frame>,
    timings: StageTimings,
}

impl Pipeline {
    /// Load the background, then acquire the webcam, the virtual camera and the model.
    ///
    /// A background that cannot be decoded is a configuration problem and is
    /// reported before any device is opened.
    pub fn open<F: DeviceFactory + ?Sized>(
        config: &SessionConfig,
        factory: &mut F,
    ) -> Result<Self, SessionError> {
        let background = factory.open_background(config).map_err(|e| {
            SessionError::configuration(format!(
                "background {} cannot be used: {e:#}",
                config.background.path.display()
            ))
        })?;
        let capture = factory
            .open_capture(config)
            .map_err(|e| SessionError::device_open("webcam", e))?;
        let output = factory
            .open_sink(config)
            .map_err(|e| SessionError::device_open("virtual camera", e))?;
        let mut model = factory
            .load_model(config)
            .map_err(|e| SessionError::device_open("segmentation model", e))?;

        let session_size = (config.width, config.height);
        let (capture_width, capture_height) = capture.resolution();
        if (capture_width, capture_height) != session_size {
            tracing::warn!(
                "Webcam delivers {}x{}, backgrounds are scaled to match",
                capture_width,
                capture_height
            );
        }
        let (output_width, output_height) = output.resolution();
        if (output_width, output_height) != session_size {
            tracing::warn!(
                "Virtual camera runs at {}x{}, frames are scaled on write",
                output_width,
                output_height
            );
        }

        model.reset_state();
        let (model_width, model_height) = model.input_size();
        tracing::info!("Segmentation input: {}x{}", model_width, model_height);

        let refiner = MaskRefiner::new(config.threshold);
        let compositor = Compositor::new(output.channel_order(), config.hologram);
        tracing::info!(
            "Matte threshold {}, hologram {}",
            refiner.threshold(),
            if compositor.hologram_enabled() { "on" } else { "off" }
        );

        Ok(Self {
            capture,
            output,
            model,
            background,
            refiner,
            compositor,
            flip: config.flip,
            show_matte: config.show_matte,
            last_output: None,
            timings: StageTimings::default(),
        })
    }

    /// Run one iteration: capture, background, segment, composite, write.
    ///
    /// Transient errors are returned after the iteration has been cleaned up,
    /// callers decide whether to keep going with `SessionError::is_transient`.
    pub fn tick(&mut self) -> Result<(), SessionError> {
        let capture_start = Instant::now();
        let captured = self
            .capture
            .capture_frame()
            .map_err(SessionError::FrameRead)?;
        self.timings.capture += capture_start.elapsed();

        let background = match self.background.next_frame() {
            Ok(background) => background,
            Err(e) => {
                if let Some(previous) = &self.last_output {
                    self.output
                        .write_frame(previous)
                        .map_err(SessionError::SinkWrite)?;
                }
                return Err(e);
            }
        };

        let frame = if self.flip {
            captured.mirrored()
        } else {
            captured
        };

        let segment_start = Instant::now();
        let raw = self
            .model
            .predict(&frame)
            .map_err(SessionError::ModelInference)?;
        let matte = self.refiner.refine(&raw);
        self.timings.segment += segment_start.elapsed();

        let composite_start = Instant::now();
        let composited = if self.show_matte {
            matte.to_frame(self.output.channel_order())
        } else {
            let (width, height) = frame.dimensions();
            let background = if background.dimensions() == (width, height) {
                background
            } else {
                background.resized(width, height)
            };
            // only fails when the provider's mask does not match the frame
            self.compositor
                .composite(&frame, &background, &matte)
                .map_err(SessionError::ModelInference)?
        };
        self.timings.composite += composite_start.elapsed();

        let output_start = Instant::now();
        self.output
            .write_frame(&composited)
            .map_err(SessionError::SinkWrite)?;
        self.timings.output += output_start.elapsed();

        self.last_output = Some(composited);
        self.timings.frames += 1;
        if self.timings.frames % 30 == 0 {
            self.timings.log();
        }

        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.timings.frames
    }
}

/// Accumulated per-stage time, reported every 30 frames
#[derive(Default)]
struct StageTimings {
    frames: u64,
    capture: Duration,
    segment: Duration,
    composite: Duration,
    output: Duration,
}

impl StageTimings {
    fn log(&self) {
        let average = |total: Duration| total.as_secs_f64() * 1000.0 / self.frames as f64;
        let (capture, segment, composite, output) = (
            average(self.capture),
            average(self.segment),
            average(self.composite),
            average(self.output),
        );
        let total_ms = capture + segment + composite + output;

        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
            self.frames,
            capture,
            segment,
            composite,
            output,
            total_ms,
            1000.0 / total_ms
        );
    }
}

/// Body of the session thread
pub(super) fn run<F: DeviceFactory>(
    config: SessionConfig,
    mut factory: F,
    token: CancellationToken,
    state: SharedState,
    events: Sender<SessionEvent>,
) {
    let mut pipeline = match Pipeline::open(&config, &mut factory) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("Session failed to start: {}", e);
            state.set(SessionState::Stopped);
            let _ = events.send(SessionEvent::Failed(e));
            return;
        }
    };

    state.set(SessionState::Running);
    let _ = events.send(SessionEvent::Ready);
    tracing::info!(
        "Session running at {}x{}, {} fps",
        config.width,
        config.height,
        config.fps
    );

    let frame_duration = Duration::from_secs_f32(1.0 / config.fps as f32);

    while !token.is_cancelled() {
        let loop_start = Instant::now();

        match pipeline.tick() {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                tracing::warn!("{}", e);
                let _ = events.send(SessionEvent::Warning(e));
            }
            Err(e) => {
                tracing::error!("Session stopped on error: {}", e);
                drop(pipeline);
                state.set(SessionState::Stopped);
                let _ = events.send(SessionEvent::Failed(e));
                return;
            }
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration && !token.is_cancelled() {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    state.set(SessionState::Stopping);
    tracing::info!("Stopping after {} frames", pipeline.frames_written());
    drop(pipeline);

    state.set(SessionState::Stopped);
    let _ = events.send(SessionEvent::Stopped);
}
