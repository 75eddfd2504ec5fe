mod live;
mod worker;

pub use live::LiveDevices;
pub use worker::Pipeline;

use crate::background::BackgroundSource;
use crate::capture::CaptureSource;
use crate::config::{Configuration, SessionConfig};
use crate::error::SessionError;
use crate::output::OutputSink;
use crate::segmentation::SegmentationProvider;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Starting,
            1 => SessionState::Running,
            2 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }
}

#[derive(Clone)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: SessionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Asks the worker to stop after its current iteration
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sent from the worker thread as the session moves through its lifecycle
#[derive(Debug)]
pub enum SessionEvent {
    /// Every device is open and frames are flowing
    Ready,
    /// A frame was skipped, the session keeps running
    Warning(SessionError),
    /// Stopped on request
    Stopped,
    /// Ended by an error; no further events follow
    Failed(SessionError),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Stopped | SessionEvent::Failed(_))
    }
}

/// Opens the handles of a session. Called on the worker thread, so the
/// handles themselves never cross threads.
pub trait DeviceFactory: Send + 'static {
    fn open_capture(&mut self, config: &SessionConfig) -> anyhow::Result<Box<dyn CaptureSource>>;

    fn open_sink(&mut self, config: &SessionConfig) -> anyhow::Result<Box<dyn OutputSink>>;

    fn load_model(
        &mut self,
        config: &SessionConfig,
    ) -> anyhow::Result<Box<dyn SegmentationProvider>>;

    fn open_background(&mut self, config: &SessionConfig) -> anyhow::Result<BackgroundSource> {
        BackgroundSource::open(&config.background, config.width, config.height)
    }
}

/// A running capture session on its own thread
pub struct Session {
    token: CancellationToken,
    state: SharedState,
    events: Receiver<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Validate `config` and start the worker.
    ///
    /// Configuration problems are reported here, before any device is touched.
    /// Device failures arrive later as `SessionEvent::Failed`.
    pub fn start<F: DeviceFactory>(config: Configuration, factory: F) -> Result<Self, SessionError> {
        Self::start_with_token(config, factory, CancellationToken::new())
    }

    pub fn start_with_token<F: DeviceFactory>(
        config: Configuration,
        factory: F,
        token: CancellationToken,
    ) -> Result<Self, SessionError> {
        let config = config.validate()?;

        let state = SharedState::new(SessionState::Starting);
        let (events_tx, events) = crossbeam_channel::unbounded();

        let worker = {
            let token = token.clone();
            let state = state.clone();
            thread::Builder::new()
                .name("capture-session".into())
                .spawn(move || worker::run(config, factory, token, state, events_tx))
                .map_err(|e| SessionError::device_open("session thread", e.into()))?
        };

        Ok(Self {
            token,
            state,
            events,
            worker: Some(worker),
        })
    }

    /// Request a stop; the worker finishes its current iteration first
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the worker thread to exit. Fails if the worker panicked.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> anyhow::Result<()> {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                self.state.set(SessionState::Stopped);
                anyhow::bail!("session thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
        if let Err(e) = self.join_worker() {
            tracing::error!("{}", e);
        }
    }
}
