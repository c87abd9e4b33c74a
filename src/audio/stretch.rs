//! Tempo change without pitch change for variable-speed playback.
//!
//! Wraps SoundTouch (WSOLA). A `TimeStretch` instance is bound to one speed.
//! Changing speed means dropping it and creating a new one.

use super::{AudioChunk, Sample};
use crate::playback::Speed;
use soundtouch::{Setting, SoundTouch};
use std::collections::VecDeque;

/// Frames requested from SoundTouch per receive call
const RECEIVE_FRAMES: usize = 2048;

/// Full scale of the integer sample type
const FULL_SCALE: f32 = 32767.0;

fn to_float(sample: Sample) -> f32 {
    sample as f32 / FULL_SCALE
}

fn to_sample(value: f32) -> Sample {
    (value * FULL_SCALE).clamp(Sample::MIN as f32, Sample::MAX as f32) as Sample
}

/// Converts chunks recorded at normal speed into samples played at `speed`.
///
/// Callers alternate `send` and `receive`: send when `is_empty()`, receive
/// otherwise, until enough samples were received or `at_end()` is true.
pub struct TimeStretch {
    processor: SoundTouch,
    channels: usize,
    /// The end of the input stream was sent
    ended: bool,
    /// Interleaved stretched samples taken out of SoundTouch
    output: VecDeque<f32>,
    scratch: Vec<f32>,
}

impl TimeStretch {
    pub fn new(sample_rate: u32, channels: u16, speed: Speed) -> Self {
        tracing::debug!(
            "Time stretch: {} Hz, {} channels, speed {}%",
            sample_rate,
            channels,
            speed.percent()
        );
        let channels = channels.max(1) as usize;

        let mut processor = SoundTouch::new();
        processor.set_sample_rate(sample_rate);
        processor.set_channels(channels as u32);
        processor.set_tempo(speed.tempo());
        processor.set_setting(Setting::UseAaFilter, 0);
        // Sequence length, seek window and overlap in ms, tuned for speech
        processor.set_setting(Setting::SequenceMs, 40);
        processor.set_setting(Setting::SeekwindowMs, 15);
        processor.set_setting(Setting::OverlapMs, 8);

        Self {
            processor,
            channels,
            ended: false,
            output: VecDeque::new(),
            scratch: Vec::new(),
        }
    }

    /// Feed the unread part of a chunk; `None` marks the end of the input
    pub fn send(&mut self, chunk: Option<AudioChunk>) {
        if self.ended {
            tracing::warn!("Time stretch: input sent after end of stream");
            return;
        }
        match chunk {
            Some(chunk) => {
                self.scratch.clear();
                self.scratch.extend(chunk.unread().iter().copied().map(to_float));
                let frames = self.scratch.len() / self.channels;
                self.processor.put_samples(&self.scratch, frames);
            }
            None => {
                self.ended = true;
                self.processor.flush();
            }
        }
        self.collect_output();
    }

    /// Move everything SoundTouch has ready into the output buffer
    fn collect_output(&mut self) {
        self.scratch.resize(RECEIVE_FRAMES * self.channels, 0.0);
        loop {
            let frames = self
                .processor
                .receive_samples(&mut self.scratch, RECEIVE_FRAMES);
            if frames == 0 {
                break;
            }
            self.output
                .extend(self.scratch[..frames * self.channels].iter().copied());
        }
    }

    /// Fill `out` with stretched samples; returns the number of samples written.
    ///
    /// Writes at most what is buffered. Once the input has ended, the part of
    /// `out` that cannot be filled is set to silence and counted as written.
    pub fn receive(&mut self, out: &mut [Sample]) -> usize {
        let required = out.len() / self.channels * self.channels;
        let written = (self.output.len() / self.channels * self.channels).min(required);

        for (slot, value) in out.iter_mut().zip(self.output.drain(..written)) {
            *slot = to_sample(value);
        }

        if self.ended {
            out[written..required].fill(0);
            required
        } else {
            written
        }
    }

    /// Stretched samples ready to be received
    pub fn available(&self) -> usize {
        self.output.len()
    }

    /// No stretched samples are buffered
    pub fn is_empty(&self) -> bool {
        self.output.len() < self.channels
    }

    /// Input ended and everything was received
    pub fn at_end(&self) -> bool {
        self.ended && self.is_empty()
    }
}

impl Drop for TimeStretch {
    fn drop(&mut self) {
        self.processor.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    fn sine_chunk(pts: i64, first_frame: usize, frames: usize, channels: u16) -> AudioChunk {
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = (first_frame + i) as f32 / RATE as f32;
            let value = to_sample((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5);
            samples.extend(std::iter::repeat_n(value, channels as usize));
        }
        AudioChunk::new(pts, channels, samples)
    }

    /// Run one second of 440 Hz through the stretcher and collect everything
    fn stretch_one_second(speed: Speed, channels: u16) -> Vec<Sample> {
        let mut stretch = TimeStretch::new(RATE, channels, speed);
        let chunk_frames = 1764;
        let mut sent = 0;
        let mut output = Vec::new();
        let mut buffer = vec![0; 1000 * channels as usize];

        loop {
            if stretch.at_end() {
                break;
            } else if stretch.is_empty() {
                if sent < RATE as usize {
                    stretch.send(Some(sine_chunk(0, sent, chunk_frames, channels)));
                    sent += chunk_frames;
                } else {
                    stretch.send(None);
                }
            } else {
                let wanted = stretch.available().min(buffer.len());
                let n = stretch.receive(&mut buffer[..wanted]);
                output.extend_from_slice(&buffer[..n]);
            }
        }
        output
    }

    fn zero_crossings(samples: &[Sample]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0) != (w[1] < 0))
            .count()
    }

    #[test]
    fn test_double_speed_halves_length() {
        let output = stretch_one_second(Speed::new(200), 2);
        // 25 chunks of 1764 frames, stereo, at twice the tempo
        let frames = output.len() / 2;
        assert_eq!(output.len() % 2, 0);
        assert!(frames.abs_diff(22050) <= 441, "frames = {frames}");
    }

    #[test]
    fn test_half_speed_doubles_length() {
        let output = stretch_one_second(Speed::new(50), 1);
        assert!(output.len().abs_diff(88200) <= 882, "samples = {}", output.len());
    }

    #[test]
    fn test_pitch_is_preserved() {
        let output = stretch_one_second(Speed::new(200), 1);
        // 0.3 s from the middle of the output, a 440 Hz tone crosses zero 880 times per second
        let middle = &output[4410..4410 + 13230];
        let crossings = zero_crossings(middle) as f64 / 0.3;
        assert!((crossings - 880.0).abs() < 880.0 * 0.1, "crossings/s = {crossings}");
    }

    #[test]
    fn test_receive_pads_silence_after_end() {
        let mut stretch = TimeStretch::new(RATE, 2, Speed::new(150));
        stretch.send(Some(sine_chunk(0, 0, 100, 2)));
        assert!(stretch.is_empty());
        stretch.send(None);
        assert!(!stretch.at_end());

        let mut out = vec![1; 2000];
        assert_eq!(stretch.receive(&mut out), 2000);
        // 100 input frames at 1.5x become about 67 frames, the rest is silence
        assert!(out[100 * 2..].iter().all(|&s| s == 0));
        assert!(stretch.at_end());
        assert_eq!(stretch.receive(&mut out), 2000);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_sample_conversion_clamps() {
        assert_eq!(to_sample(1.5), Sample::MAX);
        assert_eq!(to_sample(-1.5), Sample::MIN);
        assert_eq!(to_sample(to_float(1234)), 1234);
        assert_eq!(to_sample(to_float(-32768)), Sample::MIN);
    }
}
