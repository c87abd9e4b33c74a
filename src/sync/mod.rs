//! Audio/Video synchronization primitives.
//!
//! `Pipeline` is the state shared between the controlling thread, the two
//! producer threads and the audio render callback: both bounded queues plus a
//! handful of atomics. Everything else about a playback session is owned by
//! the controller and never touched from another thread.
//!
//! Cross-thread staleness is accepted for the atomics:
//! - `abort` is checked once per producer iteration, so a producer may finish
//!   the unit it is composing after abort was requested.
//! - `skip_frames` is written by the scheduler and decremented by the video
//!   producer; a late decrement only skips one frame more or less.
//! - The bounding box may change between two frames of the same run.

pub mod clock;
pub mod queue;
pub mod scheduler;

pub use clock::{Clock, ManualClock, MonotonicClock, PlaybackClock};
pub use queue::BoundedQueue;
pub use scheduler::{DisplayTimer, FrameTiming, SkipBackoff};

use crate::audio::AudioChunk;
use crate::convert::Pts;
use crate::video::VideoFrame;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

/// Queues and flags shared by everybody taking part in playback
pub struct Pipeline {
    /// Audio chunks; `None` marks the end of the stream
    pub audio: BoundedQueue<Option<AudioChunk>>,
    /// Video frames; `None` marks the end of the stream
    pub video: BoundedQueue<Option<VideoFrame>>,
    abort: AtomicBool,
    skip_frames: AtomicU32,
    width: AtomicU32,
    height: AtomicU32,
    start_pts: AtomicI64,
}

impl Pipeline {
    pub fn new(audio_capacity: usize, video_capacity: usize) -> Self {
        Self {
            audio: BoundedQueue::new(audio_capacity),
            video: BoundedQueue::new(video_capacity),
            abort: AtomicBool::new(false),
            skip_frames: AtomicU32::new(0),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            start_pts: AtomicI64::new(0),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Stop both producers: raise the abort flag, then close both queues so
    /// that no thread stays blocked in `push` or `pop`.
    ///
    /// Safe to call from any thread, any number of times.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
        self.audio.close();
        self.video.close();
    }

    /// Empty both queues
    pub fn flush(&self) {
        self.audio.flush();
        self.video.flush();
    }

    /// Prepare for a new run: empty and reopen the queues, clear abort and skip
    pub fn rearm(&self) {
        self.flush();
        self.audio.reopen();
        self.video.reopen();
        self.skip_frames.store(0, Ordering::Release);
        self.abort.store(false, Ordering::Release);
    }

    pub fn skip_frames(&self) -> u32 {
        self.skip_frames.load(Ordering::Acquire)
    }

    pub fn set_skip_frames(&self, count: u32) {
        self.skip_frames.store(count, Ordering::Release);
    }

    /// Count one skipped frame, unless the scheduler changed the count meanwhile
    pub fn consume_skip(&self, observed: u32) {
        if observed > 0 {
            let _ = self.skip_frames.compare_exchange(
                observed,
                observed - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    pub fn bounding_box(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Acquire),
            self.height.load(Ordering::Acquire),
        )
    }

    /// Returns true if the size changed
    pub fn set_bounding_box(&self, width: u32, height: u32) -> bool {
        let old_width = self.width.swap(width, Ordering::AcqRel);
        let old_height = self.height.swap(height, Ordering::AcqRel);
        old_width != width || old_height != height
    }

    /// Position at which the current run started
    pub fn start_pts(&self) -> Pts {
        self.start_pts.load(Ordering::Acquire)
    }

    pub fn set_start_pts(&self, position: Pts) {
        self.start_pts.store(position, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_abort_unblocks_both_queues() {
        let pipeline = Arc::new(Pipeline::new(1, 1));
        pipeline.audio.push(None);
        pipeline.video.push(None);

        let audio_pusher = {
            let pipeline = pipeline.clone();
            thread::spawn(move || pipeline.audio.push(None))
        };
        let video_pusher = {
            let pipeline = pipeline.clone();
            thread::spawn(move || pipeline.video.push(None))
        };

        thread::sleep(Duration::from_millis(20));
        pipeline.abort();
        assert!(pipeline.is_aborted());
        assert!(!audio_pusher.join().unwrap());
        assert!(!video_pusher.join().unwrap());
    }

    #[test]
    fn test_rearm_clears_state() {
        let pipeline = Pipeline::new(4, 4);
        pipeline.video.push(None);
        pipeline.set_skip_frames(10);
        pipeline.abort();

        pipeline.rearm();
        assert!(!pipeline.is_aborted());
        assert!(pipeline.video.is_empty());
        assert!(!pipeline.video.is_closed());
        assert_eq!(pipeline.skip_frames(), 0);
    }

    #[test]
    fn test_consume_skip_respects_concurrent_update() {
        let pipeline = Pipeline::new(1, 1);
        pipeline.set_skip_frames(5);
        pipeline.consume_skip(5);
        assert_eq!(pipeline.skip_frames(), 4);

        // Scheduler escalated in between: the stale decrement is dropped
        pipeline.set_skip_frames(10);
        pipeline.consume_skip(4);
        assert_eq!(pipeline.skip_frames(), 10);
    }

    #[test]
    fn test_bounding_box_change_detection() {
        let pipeline = Pipeline::new(1, 1);
        assert!(pipeline.set_bounding_box(320, 180));
        assert!(!pipeline.set_bounding_box(320, 180));
        assert_eq!(pipeline.bounding_box(), (320, 180));
    }
}
