mod background;
mod capture;
mod compositor;
mod config;
mod error;
mod frame;
mod hologram;
mod matte;
mod output;
mod segmentation;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use config::{BackgroundConfig, Configuration};
use output::PixelFormat;
use segmentation::ModelQuality;
use session::{LiveDevices, Pipeline, Session, SessionEvent};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output resolution width
    #[arg(long, default_value_t = config::DEFAULT_WIDTH)]
    width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = config::DEFAULT_HEIGHT)]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = config::DEFAULT_FPS)]
    fps: u32,

    /// Image, animated image or video shown behind you
    #[arg(short, long)]
    background: Option<PathBuf>,

    /// Loop through the background's frames instead of showing a still
    #[arg(long)]
    animated: bool,

    /// Mirror the camera horizontally
    #[arg(long)]
    flip: bool,

    /// Blue scanline look for the person
    #[arg(long)]
    hologram: bool,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = config::DEFAULT_OUTPUT_DEVICE)]
    output_device: PathBuf,

    /// Pixel format written to the virtual camera
    #[arg(long, value_enum, default_value_t = PixelFormat::Yuyv)]
    output_format: PixelFormat,

    /// Path to segmentation model (ONNX file)
    #[arg(long, default_value = config::DEFAULT_MODEL)]
    model: PathBuf,

    /// Segmentation resolution
    #[arg(long, value_enum, default_value_t = ModelQuality::Medium)]
    quality: ModelQuality,

    /// Person probability above which a pixel belongs to the person
    #[arg(long, default_value_t = matte::DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Run the pipeline on a single frame and save it as a PNG instead of streaming
    #[arg(long, value_name = "PNG")]
    snapshot: Option<PathBuf>,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn configuration(&self) -> Configuration {
        Configuration {
            width: self.width,
            height: self.height,
            fps: self.fps,
            flip: self.flip,
            hologram: self.hologram,
            background: self.background.clone().map(|path| BackgroundConfig {
                path,
                animated: self.animated,
            }),
            input_device: self.input_device,
            output_device: self.output_device.clone(),
            output_format: self.output_format,
            model: self.model.clone(),
            quality: self.quality,
            threshold: self.threshold,
            show_matte: self.show_matte,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let result = if args.list_devices {
        list_devices()
    } else if let Some(path) = args.snapshot.clone() {
        snapshot(args.configuration(), path)
    } else {
        stream(args.configuration())
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_devices() -> Result<()> {
    let devices = capture::list_devices().context("Failed to query capture devices")?;
    if devices.is_empty() {
        println!("No capture devices found");
    }
    for (index, name) in devices {
        println!("{index}: {name}");
    }
    Ok(())
}

/// Push one frame through the whole pipeline and write it to `path`
fn snapshot(config: Configuration, path: PathBuf) -> Result<()> {
    let config = config.validate()?;
    let mut devices = LiveDevices::with_snapshot(path);

    let mut pipeline = Pipeline::open(&config, &mut devices)?;
    pipeline.tick()?;
    Ok(())
}

fn stream(config: Configuration) -> Result<()> {
    tracing::info!("Camola starting");
    tracing::info!("Output: {}x{} at {} fps", config.width, config.height, config.fps);

    let session = Session::start(config, LiveDevices::new())?;

    let token = session.token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl+C handler")?;

    let mut outcome: Result<()> = Ok(());
    for event in session.events().iter() {
        match event {
            SessionEvent::Ready => tracing::info!("Virtual camera is live, press Ctrl+C to stop"),
            SessionEvent::Warning(e) => tracing::warn!("Frame skipped: {}", e),
            SessionEvent::Stopped => {
                tracing::info!("Stopped");
                break;
            }
            SessionEvent::Failed(e) => {
                outcome = Err(e.into());
                break;
            }
        }
    }

    let joined = session.join();
    outcome?;
    joined
}
