//! Playback session: speed, pause/resume state, notifications and errors.
pub mod controller;

pub use controller::PlaybackController;

use crate::audio::AudioError;
use crate::convert::Pts;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Playback speed in percent of normal speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Speed(u32);

impl Speed {
    pub const MIN: Speed = Speed(50);
    pub const MAX: Speed = Speed(200);
    pub const NORMAL: Speed = Speed(100);

    /// Speed clamped to the supported range
    pub fn new(percent: u32) -> Self {
        Speed(percent.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn percent(&self) -> u32 {
        self.0
    }

    pub fn is_normal(&self) -> bool {
        *self == Self::NORMAL
    }

    /// Wall-clock seconds per second of content
    pub fn factor(&self) -> f64 {
        Self::NORMAL.0 as f64 / self.0 as f64
    }

    /// Seconds of content per wall-clock second
    pub fn tempo(&self) -> f64 {
        self.0 as f64 / Self::NORMAL.0 as f64
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u32> for Speed {
    fn from(percent: u32) -> Self {
        Self::new(percent)
    }
}

impl From<Speed> for u32 {
    fn from(speed: Speed) -> Self {
        speed.0
    }
}

/// State captured by `pause` and restored by `resume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeInfo {
    pub playing: bool,
    pub position: Pts,
    pub range: Option<(Pts, Pts)>,
}

/// Notifications for the controlling application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Playback started (`true`) or stopped (`false`)
    Active(bool),
    /// Position of the frame now shown
    Position(Pts),
    /// The current frame changed and should be redrawn
    Refresh,
}

/// Reporting channel for conditions the user must be told about.
///
/// Called on the controlling thread only.
pub trait Diagnostics: Send + Sync {
    /// An audio device could not be opened, started or stopped
    fn device_error(&self, message: &str);

    /// Short status line
    fn status(&self, _message: &str) {}
}

/// Diagnostics that only write to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn device_error(&self, message: &str) {
        tracing::error!("Audio device: {}", message);
    }

    fn status(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Playback errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio device error: {0}")]
    Device(#[from] AudioError),

    #[error("Invalid range: {from}..{to}")]
    InvalidRange { from: Pts, to: Pts },

    #[error("Failed to spawn producer thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}
