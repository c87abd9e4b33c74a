/// Video side of the playback pipeline
pub mod producer;

pub use producer::VideoProducer;

use crate::convert::Pts;

/// Composed video frame with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub pts: Pts,
    pub width: u32,
    pub height: u32,
    /// RGBA pixels, empty for frames that were only decoded to advance position
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(pts: Pts, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            pts,
            width,
            height,
            data,
        }
    }

    /// Placeholder returned for a skip request
    pub fn skipped(pts: Pts) -> Self {
        Self::new(pts, 0, 0, Vec::new())
    }

    pub fn is_skipped(&self) -> bool {
        self.data.is_empty()
    }
}
