//! Contract with the media model that composes frames and audio.
//!
//! The engine never decides what a frame looks like; it only asks the model
//! for the next unit at the right moment. Both producer threads call into the
//! model concurrently (one for audio, one for video), so implementations keep
//! separate read cursors per stream and do their own locking.

pub mod synthetic;

pub use synthetic::SyntheticModel;

use crate::audio::AudioChunk;
use crate::convert::{FrameRate, Pts};
use crate::video::VideoFrame;
use thiserror::Error;

/// Media model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Parameters for composing the next audio chunk
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParameters {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_rate: FrameRate,
}

impl AudioParameters {
    pub fn new(sample_rate: u32, channels: u16, frame_rate: FrameRate) -> Self {
        Self {
            sample_rate,
            channels,
            frame_rate,
        }
    }

    /// Interleaved samples required to cover the frame at `pts`
    pub fn chunk_size(&self, pts: Pts) -> usize {
        self.frame_rate.samples_in_frame(self.sample_rate, pts) * self.channels as usize
    }
}

/// Parameters for composing the next video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParameters {
    /// Size of the area the frame must fit in
    pub bounding_box: (u32, u32),
    /// Only advance the decode position, do not compose an image
    pub skip: bool,
    /// Explicit position; `None` continues from the model's cursor
    pub pts: Option<Pts>,
    /// Draw the outline of the output area on the frame
    pub draw_bounding_box: bool,
}

impl VideoParameters {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            bounding_box: (width, height),
            skip: false,
            pts: None,
            draw_bounding_box: false,
        }
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_pts(mut self, pts: Pts) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_bounding_box_outline(mut self, draw: bool) -> Self {
        self.draw_bounding_box = draw;
        self
    }

    pub fn is_empty_area(&self) -> bool {
        self.bounding_box.0 == 0 || self.bounding_box.1 == 0
    }
}

/// Source of composed audio and video.
///
/// `Ok(None)` marks the end of the stream.
#[cfg_attr(test, mockall::automock)]
pub trait MediaModel: Send + Sync {
    /// Compose the next audio chunk
    fn next_audio(&self, params: &AudioParameters) -> Result<Option<AudioChunk>, ModelError>;

    /// Compose the next video frame
    fn next_video(&self, params: &VideoParameters) -> Result<Option<VideoFrame>, ModelError>;

    /// Reposition both read cursors; only called while no producer is running
    fn move_to(&self, position: Pts);
}
