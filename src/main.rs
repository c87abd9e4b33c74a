use anyhow::{Context, Result};
use clap::Parser;
use preview_sync::{
    Config, PlaybackController, PlaybackEvent,
    audio::{AudioOutput, CpalOutput, NullOutput},
    convert::{FrameRate, Pts},
    model::SyntheticModel,
    playback::LogDiagnostics,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest sleep of the event loop between two polls
const MAX_IDLE: Duration = Duration::from_millis(10);

/// Headless preview player for a synthetic test pattern
#[derive(Parser, Debug, Clone)]
#[command(name = "preview-sync")]
#[command(about = "Play a test pattern in sync with the audio output clock", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback speed in percent (50-200)
    #[arg(short, long)]
    speed: Option<u32>,

    /// Project frame rate (frames per second)
    #[arg(long)]
    fps: Option<u32>,

    /// Length of the test pattern in frames
    #[arg(short, long, default_value_t = 250)]
    length: Pts,

    /// Start position in frames
    #[arg(long, default_value_t = 0)]
    start: Pts,

    /// Play FROM..TO in a loop (video only)
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    range: Option<Vec<Pts>>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Artificial composition time per frame in milliseconds
    #[arg(long, default_value_t = 0)]
    frame_cost_ms: u64,

    /// Disable audio
    #[arg(long, default_value_t = false)]
    no_audio: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(speed) = args.speed {
        config.playback.default_speed = speed.into();
    }
    if let Some(fps) = args.fps {
        config.playback.frame_rate = FrameRate::new(fps, 1);
    }
    if args.no_audio {
        config.audio.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    info!("Starting preview-sync");
    info!(
        "Length: {} frames, speed: {}%, audio: {}",
        args.length,
        config.playback.default_speed.percent(),
        config.audio.enabled
    );

    let output: Box<dyn AudioOutput> = if config.audio.enabled {
        match CpalOutput::new() {
            Ok(output) => Box::new(output),
            Err(e) => {
                warn!("No audio output ({}), continuing without audio", e);
                config.audio.enabled = false;
                Box::new(NullOutput::new())
            }
        }
    } else {
        Box::new(NullOutput::new())
    };

    let model = Arc::new(
        SyntheticModel::new(args.length, config.playback.frame_rate)
            .with_frame_cost(Duration::from_millis(args.frame_cost_ms)),
    );

    let mut controller =
        PlaybackController::new(model, output, Arc::new(LogDiagnostics), config);
    let events = controller.events();

    controller.move_to(args.start);
    match args.range.as_deref() {
        Some(&[from, to]) => controller.play_range(from, to)?,
        _ => controller.play()?,
    }

    let stop_at = args.seconds.map(|s| Instant::now() + Duration::from_secs_f64(s));
    let mut shown = 0usize;

    loop {
        controller.poll(Instant::now());

        for event in events.try_iter() {
            match event {
                PlaybackEvent::Active(active) => info!("Playback {}", if active { "started" } else { "stopped" }),
                PlaybackEvent::Position(position) => {
                    shown += 1;
                    debug!("Frame {}", position);
                }
                PlaybackEvent::Refresh => {}
            }
        }

        if controller.at_end() {
            info!("End of stream at frame {}", controller.current_position());
            break;
        }
        if !controller.is_playing() {
            warn!("Playback ended unexpectedly");
            break;
        }
        if stop_at.is_some_and(|t| Instant::now() >= t) {
            break;
        }

        let wait = controller
            .next_deadline()
            .map_or(MAX_IDLE, |d| d.saturating_duration_since(Instant::now()))
            .min(MAX_IDLE);
        thread::sleep(wait);
    }

    controller.stop();
    info!("Shown {} frames", shown);

    Ok(())
}
