/// Audio side of the playback pipeline
pub mod feed;
pub mod player;
pub mod producer;
pub mod stretch;

pub use feed::AudioFeed;
pub use player::{AudioOutput, CpalOutput, NullOutput, OutputFormat, RenderFn};
pub use producer::AudioProducer;
pub use stretch::TimeStretch;

use crate::convert::Pts;
use thiserror::Error;

/// Native sample type of the engine (interleaved, signed 16 bit)
pub type Sample = i16;

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Opening audio stream failed: {0}")]
    Open(String),

    #[error("Starting audio stream failed: {0}")]
    Start(String),

    #[error("Stopping audio stream failed: {0}")]
    Stop(String),

    #[error("Audio stream is not open")]
    NotOpen,
}

/// Interleaved audio samples tagged with a logical position
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub pts: Pts,
    pub channels: u16,
    samples: Vec<Sample>,
    /// Samples already handed to the output
    read: usize,
}

impl AudioChunk {
    pub fn new(pts: Pts, channels: u16, samples: Vec<Sample>) -> Self {
        Self {
            pts,
            channels,
            samples,
            read: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples not yet extracted
    pub fn unread(&self) -> &[Sample] {
        &self.samples[self.read..]
    }

    pub fn unread_count(&self) -> usize {
        self.samples.len() - self.read
    }

    /// Copy as many unread samples as fit into `out`; returns the number copied
    pub fn extract(&mut self, out: &mut [Sample]) -> usize {
        let count = self.unread_count().min(out.len());
        out[..count].copy_from_slice(&self.samples[self.read..self.read + count]);
        self.read += count;
        count
    }
}
