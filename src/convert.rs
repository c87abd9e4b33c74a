/// Conversions between logical positions (pts), wall-clock time and audio samples
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logical position in project frames
pub type Pts = i64;

/// Project frame rate as a rational number (frames per second = num / den)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Frames per second as a float
    pub fn fps(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Seconds covered by `position` frames
    pub fn pts_to_seconds(&self, position: Pts) -> f64 {
        position as f64 * self.den as f64 / self.num as f64
    }

    /// Milliseconds covered by `position` frames, rounded to the nearest millisecond
    pub fn pts_to_millis(&self, position: Pts) -> i64 {
        let numerator = position as i128 * 1000 * self.den as i128;
        let denominator = self.num as i128;
        ((2 * numerator + denominator) / (2 * denominator)) as i64
    }

    /// Duration of one project frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.pts_to_millis(1).max(1) as u64)
    }

    /// Number of whole frames in one second, rounded up
    pub fn frames_per_second_ceil(&self) -> u32 {
        self.num.div_ceil(self.den)
    }

    /// Samples per channel from position zero up to (not including) `position`
    pub fn samples_at(&self, sample_rate: u32, position: Pts) -> i64 {
        let total = position as i128 * sample_rate as i128 * self.den as i128;
        total.div_euclid(self.num as i128) as i64
    }

    /// Samples per channel covered by the single frame at `position`
    ///
    /// Computed as a difference of absolute positions so that consecutive
    /// chunks add up to exactly the right total.
    pub fn samples_in_frame(&self, sample_rate: u32, position: Pts) -> usize {
        (self.samples_at(sample_rate, position + 1) - self.samples_at(sample_rate, position)) as usize
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(25, 1)
    }
}

/// Seconds covered by `samples` interleaved samples
pub fn samples_to_seconds(samples: usize, sample_rate: u32, channels: u16) -> f64 {
    samples as f64 / (sample_rate as f64 * channels as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_to_time() {
        let rate = FrameRate::new(25, 1);
        assert_eq!(rate.pts_to_millis(1), 40);
        assert_eq!(rate.pts_to_millis(25), 1000);
        assert!((rate.pts_to_seconds(50) - 2.0).abs() < 1e-9);
        assert_eq!(rate.frame_duration(), Duration::from_millis(40));
    }

    #[test]
    fn test_ntsc_chunk_sizes_do_not_drift() {
        let rate = FrameRate::new(30000, 1001);
        let total: usize = (0..30000).map(|p| rate.samples_in_frame(48000, p)).sum();
        assert_eq!(total as i64, rate.samples_at(48000, 30000));
        assert_eq!(rate.frames_per_second_ceil(), 30);
    }

    #[test]
    fn test_samples_to_seconds() {
        assert!((samples_to_seconds(88200, 44100, 2) - 1.0).abs() < 1e-9);
    }
}
