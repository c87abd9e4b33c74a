//! Real-time audio/video preview playback library
//!
//! Pulls composed frames and audio chunks from a media model on two producer
//! threads, buffers them in bounded queues and presents them in step with the
//! clock of the audio output, with variable speed, frame skipping under load
//! and looped range playback.

pub mod audio;
pub mod config;
pub mod convert;
pub mod model;
pub mod playback;
pub mod sync;
pub mod video;

pub use config::Config;
pub use model::MediaModel;
pub use playback::{PlaybackController, PlaybackEvent, ResumeInfo, Speed};

/// Result type for the application
pub type Result<T> = anyhow::Result<T>;
