use super::{AudioParameters, MediaModel, ModelError, VideoParameters};
use crate::audio::AudioChunk;
use crate::convert::{FrameRate, Pts};
use crate::video::VideoFrame;
use parking_lot::Mutex;
use std::time::Duration;

/// Largest frame the test pattern renders, whatever the bounding box
const MAX_WIDTH: u32 = 640;
const MAX_HEIGHT: u32 = 360;

const TONE_HZ: f32 = 440.0;

/// Read positions, one per stream
#[derive(Debug, Default)]
struct Cursors {
    audio: Pts,
    video: Pts,
}

/// Test-pattern model: a sweeping colour gradient with a moving bar and a
/// sine tone, `length` frames long.
pub struct SyntheticModel {
    length: Pts,
    frame_rate: FrameRate,
    /// Artificial composition time per rendered video frame
    frame_cost: Duration,
    cursors: Mutex<Cursors>,
}

impl SyntheticModel {
    pub fn new(length: Pts, frame_rate: FrameRate) -> Self {
        Self {
            length,
            frame_rate,
            frame_cost: Duration::ZERO,
            cursors: Mutex::new(Cursors::default()),
        }
    }

    /// Make each rendered (non-skipped) frame take this long to compose
    pub fn with_frame_cost(mut self, cost: Duration) -> Self {
        self.frame_cost = cost;
        self
    }

    fn render_tone(&self, params: &AudioParameters, pts: Pts) -> AudioChunk {
        let channels = params.channels as usize;
        let frames = params.chunk_size(pts) / channels.max(1);
        let first = self.frame_rate.samples_at(params.sample_rate, pts);
        let rate = params.sample_rate as f32;

        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = (first + i as i64) as f32 / rate;
            let value = (t * TONE_HZ * 2.0 * std::f32::consts::PI).sin();
            // 30% volume
            let sample = (value * 0.3 * i16::MAX as f32) as i16;
            samples.extend(std::iter::repeat_n(sample, channels));
        }
        AudioChunk::new(pts, params.channels, samples)
    }

    fn render_frame(&self, params: &VideoParameters, pts: Pts) -> VideoFrame {
        let width = params.bounding_box.0.min(MAX_WIDTH);
        let height = params.bounding_box.1.min(MAX_HEIGHT);
        let w = width as usize;
        let h = height as usize;
        let mut pixels = vec![0u8; w * h * 4];

        let phase = self.frame_rate.pts_to_seconds(pts) as f32;
        let bar_pos = (phase * 0.2) % 1.0;

        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 4;
                let nx = x as f32 / w as f32;
                let ny = y as f32 / h as f32;

                let hue = (nx * 180.0 + phase * 60.0).rem_euclid(360.0);
                let (r, g, b) = hsv_to_rgb(hue, 0.6, 0.7 + 0.3 * ny);
                let bar = (1.0 - (nx - bar_pos).abs() * 10.0).clamp(0.0, 0.3);
                let outline = params.draw_bounding_box
                    && (x == 0 || y == 0 || x + 1 == w || y + 1 == h);

                if outline {
                    pixels[offset..offset + 4].copy_from_slice(&[255, 0, 0, 255]);
                } else {
                    pixels[offset] = ((r + bar).clamp(0.0, 1.0) * 255.0) as u8;
                    pixels[offset + 1] = ((g + bar).clamp(0.0, 1.0) * 255.0) as u8;
                    pixels[offset + 2] = ((b + bar).clamp(0.0, 1.0) * 255.0) as u8;
                    pixels[offset + 3] = 255;
                }
            }
        }

        VideoFrame::new(pts, width, height, pixels)
    }
}

impl MediaModel for SyntheticModel {
    fn next_audio(&self, params: &AudioParameters) -> Result<Option<AudioChunk>, ModelError> {
        let pts = {
            let mut cursors = self.cursors.lock();
            let pts = cursors.audio;
            if pts >= self.length {
                return Ok(None);
            }
            cursors.audio = pts + 1;
            pts
        };
        Ok(Some(self.render_tone(params, pts)))
    }

    fn next_video(&self, params: &VideoParameters) -> Result<Option<VideoFrame>, ModelError> {
        let pts = {
            let mut cursors = self.cursors.lock();
            let pts = params.pts.unwrap_or(cursors.video);
            if pts >= self.length {
                return Ok(None);
            }
            cursors.video = pts + 1;
            pts
        };

        if params.skip {
            return Ok(Some(VideoFrame::skipped(pts)));
        }
        if !self.frame_cost.is_zero() {
            std::thread::sleep(self.frame_cost);
        }
        Ok(Some(self.render_frame(params, pts)))
    }

    fn move_to(&self, position: Pts) {
        let mut cursors = self.cursors.lock();
        let position = position.clamp(0, self.length);
        cursors.audio = position;
        cursors.video = position;
    }
}

/// Convert HSV to RGB. H in [0, 360], S and V in [0, 1]. Returns (r, g, b) in [0, 1].
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - (h_prime % 2.0 - 1.0).abs());
    let m = v - c;

    let (r1, g1, b1) = match h_prime as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (r1 + m, g1 + m, b1 + m)
}
