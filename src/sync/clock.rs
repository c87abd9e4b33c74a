//! Playback clock driven by the audio output.
//!
//! The only source of wall-clock truth during playback is the audio stream
//! time reported by the output device. `PlaybackClock` combines that time with
//! the moment playback started and the latency measured by the render callback.
//!
//! Start time and latency live in atomics. The render callback is the only
//! writer of the latency and the controlling thread reads it once per shown
//! frame; a value that is one callback stale only adds a few milliseconds of
//! jitter, so no lock is taken.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source of an audio stream
pub trait Clock: Send + Sync {
    /// Time since the stream was opened
    fn now(&self) -> Duration;
}

/// Clock counting from the moment it was (re)started, used when the device
/// does not report its own stream time
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Mutex<Instant>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Mutex::new(Instant::now()),
        }
    }

    /// Restart counting from zero
    pub fn restart(&self) {
        *self.origin.lock() = Instant::now();
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.lock().elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, time: Duration) {
        self.micros.store(time.as_micros() as i64, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Duration) {
        self.micros.fetch_add(delta.as_micros() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst).max(0) as u64)
    }
}

/// Stream time corrected for playback start and output latency
pub struct PlaybackClock {
    source: Arc<dyn Clock>,
    start_micros: AtomicI64,
    latency_micros: AtomicI64,
}

impl PlaybackClock {
    pub fn new(source: Arc<dyn Clock>) -> Self {
        Self {
            source,
            start_micros: AtomicI64::new(0),
            latency_micros: AtomicI64::new(0),
        }
    }

    /// Raw stream time in seconds
    pub fn now_secs(&self) -> f64 {
        self.source.now().as_secs_f64()
    }

    /// Record the current stream time as the start of playback and forget the
    /// latency of the previous run
    pub fn mark_start(&self) {
        let now = self.source.now().as_micros() as i64;
        self.start_micros.store(now, Ordering::Release);
        self.latency_micros.store(0, Ordering::Release);
    }

    /// Stream time (seconds) at which playback started
    pub fn start_secs(&self) -> f64 {
        self.start_micros.load(Ordering::Acquire) as f64 / 1e6
    }

    /// Set the difference between the actual and the expected output time of audio
    pub fn set_latency(&self, latency_secs: f64) {
        self.latency_micros
            .store((latency_secs * 1e6).round() as i64, Ordering::Release);
    }

    pub fn latency_secs(&self) -> f64 {
        self.latency_micros.load(Ordering::Acquire) as f64 / 1e6
    }

    /// Seconds of content played since playback started
    pub fn elapsed_secs(&self) -> f64 {
        self.now_secs() - self.start_secs() - self.latency_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_subtracts_start_and_latency() {
        let source = Arc::new(ManualClock::new());
        source.set(Duration::from_millis(500));

        let clock = PlaybackClock::new(source.clone());
        clock.mark_start();
        assert!((clock.start_secs() - 0.5).abs() < 1e-9);

        source.advance(Duration::from_millis(1000));
        assert!((clock.elapsed_secs() - 1.0).abs() < 1e-6);

        clock.set_latency(0.1);
        assert!((clock.elapsed_secs() - 0.9).abs() < 1e-6);

        clock.set_latency(-0.05);
        assert!((clock.elapsed_secs() - 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_mark_start_resets_latency() {
        let clock = PlaybackClock::new(Arc::new(ManualClock::new()));
        clock.set_latency(0.25);
        clock.mark_start();
        assert_eq!(clock.latency_secs(), 0.0);
    }

    #[test]
    fn test_monotonic_clock_restart() {
        let clock = MonotonicClock::new();
        std::thread::sleep(Duration::from_millis(5));
        let before = clock.now();
        assert!(before >= Duration::from_millis(5));
        clock.restart();
        assert!(clock.now() < before);
    }
}
