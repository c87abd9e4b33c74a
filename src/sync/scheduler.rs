//! Frame presentation timing.
//!
//! The controller pops one frame per timer expiry and asks this module when it
//! is due. A frame whose due time has already passed is either dropped in
//! favour of the next buffered frame, or (when nothing is buffered) triggers
//! the skip back-off that tells the video producer to decode frames without
//! rendering them until it has caught up.

use crate::convert::{FrameRate, Pts};
use std::time::{Duration, Instant};

/// First skip count after falling behind with nothing buffered
pub const INITIAL_SKIP_FRAMES: u32 = 5;

/// Seconds after playback start at which the frame at `position` must be shown
pub fn target_time(position: Pts, start_pts: Pts, speed_factor: f64, rate: FrameRate) -> f64 {
    rate.pts_to_seconds(position - start_pts) * speed_factor
}

/// Whole milliseconds to wait before showing a frame; negative when late
pub fn sleep_millis(target_secs: f64, elapsed_secs: f64) -> i64 {
    ((target_secs - elapsed_secs) * 1000.0).floor() as i64
}

/// Outcome of timing one popped frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTiming {
    /// Show now, then wait this long before the next frame
    OnTime(Duration),
    /// Already too late to show
    Late,
}

pub fn frame_timing(
    position: Pts,
    start_pts: Pts,
    speed_factor: f64,
    rate: FrameRate,
    elapsed_secs: f64,
) -> FrameTiming {
    let sleep = sleep_millis(target_time(position, start_pts, speed_factor, rate), elapsed_secs);
    if sleep < 0 {
        FrameTiming::Late
    } else {
        FrameTiming::OnTime(Duration::from_millis(sleep as u64))
    }
}

/// Multiplicative back-off for the number of frames to skip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipBackoff {
    cap: u32,
}

impl SkipBackoff {
    /// Back-off that never asks for more than `cap` frames (at least the initial step)
    pub fn new(cap: u32) -> Self {
        Self {
            cap: cap.max(INITIAL_SKIP_FRAMES),
        }
    }

    /// Back-off capped at one second worth of frames
    pub fn for_frame_rate(rate: FrameRate) -> Self {
        Self::new(rate.frames_per_second_ceil())
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Skip count after another late frame with an empty queue
    pub fn escalate(&self, current: u32) -> u32 {
        if current == 0 {
            INITIAL_SKIP_FRAMES
        } else {
            current.saturating_mul(2).min(self.cap)
        }
    }
}

/// Single-shot timer polled by the controlling thread's event loop
#[derive(Debug, Default)]
pub struct DisplayTimer {
    deadline: Option<Instant>,
}

impl DisplayTimer {
    pub fn start_once(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return true if the deadline has passed
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
