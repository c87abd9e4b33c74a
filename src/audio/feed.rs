use super::{AudioChunk, Sample};
use crate::convert::{FrameRate, samples_to_seconds};
use crate::sync::{Pipeline, PlaybackClock};
use std::sync::Arc;
use std::time::Duration;

/// Render side of the audio queue, called from the output device's real-time
/// callback.
///
/// Never blocks: when no chunk is buffered the buffer is filled with silence.
/// Every time a new chunk is taken, the difference between the moment its
/// first sample is heard and the moment it should be heard is stored as the
/// playback clock latency.
pub struct AudioFeed {
    pipeline: Arc<Pipeline>,
    clock: Arc<PlaybackClock>,
    frame_rate: FrameRate,
    sample_rate: u32,
    channels: u16,
    current: Option<AudioChunk>,
    finished: bool,
}

impl AudioFeed {
    pub fn new(
        pipeline: Arc<Pipeline>,
        clock: Arc<PlaybackClock>,
        frame_rate: FrameRate,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            pipeline,
            clock,
            frame_rate,
            sample_rate,
            channels,
            current: None,
            finished: false,
        }
    }

    /// Fill `out` with interleaved samples.
    ///
    /// `playtime` is the stream time at which the first sample of `out` will
    /// be heard. Returns false once playback is finished (end of stream or
    /// abort); `out` is silence from then on.
    pub fn render(&mut self, out: &mut [Sample], playtime: Duration) -> bool {
        if self.finished {
            out.fill(0);
            return false;
        }

        let mut written = 0;
        while written < out.len() {
            let exhausted = self
                .current
                .as_ref()
                .is_none_or(|chunk| chunk.unread_count() == 0);

            if exhausted {
                if self.pipeline.is_aborted() {
                    out[written..].fill(0);
                    tracing::debug!("Audio render: abort");
                    self.finished = true;
                    return false;
                }

                match self.pipeline.audio.try_pop() {
                    None => {
                        out[written..].fill(0);
                        tracing::warn!("Audio underflow");
                        return true;
                    }
                    Some(None) => {
                        out[written..].fill(0);
                        tracing::info!("Audio render: end of stream");
                        self.finished = true;
                        return false;
                    }
                    Some(Some(chunk)) => {
                        self.measure_latency(&chunk, playtime, written);
                        self.current = Some(chunk);
                    }
                }
            }

            if let Some(chunk) = self.current.as_mut() {
                written += chunk.extract(&mut out[written..]);
            }
        }
        true
    }

    fn measure_latency(&self, chunk: &AudioChunk, playtime: Duration, offset: usize) {
        let heard = playtime.as_secs_f64()
            + samples_to_seconds(offset, self.sample_rate, self.channels)
            - self.clock.start_secs();
        let expected = self
            .frame_rate
            .pts_to_seconds(chunk.pts - self.pipeline.start_pts());
        self.clock.set_latency(heard - expected);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ManualClock;

    /// 25 fps at 100 Hz mono: four samples per frame
    fn feed() -> (AudioFeed, Arc<Pipeline>, Arc<PlaybackClock>) {
        let pipeline = Arc::new(Pipeline::new(8, 8));
        let clock = Arc::new(PlaybackClock::new(Arc::new(ManualClock::new())));
        clock.mark_start();
        let feed = AudioFeed::new(pipeline.clone(), clock.clone(), FrameRate::new(25, 1), 100, 1);
        (feed, pipeline, clock)
    }

    #[test]
    fn test_silence_on_underflow() {
        let (mut feed, _pipeline, _clock) = feed();
        let mut out = vec![7; 512];
        assert!(feed.render(&mut out, Duration::ZERO));
        assert_eq!(out.len(), 512);
        assert!(out.iter().all(|&s| s == 0));
        assert!(!feed.is_finished());
    }

    #[test]
    fn test_chunks_are_concatenated() {
        let (mut feed, pipeline, _clock) = feed();
        pipeline.audio.push(Some(AudioChunk::new(0, 1, vec![1, 2, 3, 4])));
        pipeline.audio.push(Some(AudioChunk::new(1, 1, vec![5, 6, 7, 8])));

        let mut out = [0; 6];
        assert!(feed.render(&mut out, Duration::ZERO));
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);

        // Rest of the second chunk, then underflow
        assert!(feed.render(&mut out, Duration::ZERO));
        assert_eq!(out, [7, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn test_latency_uses_chunk_offset_in_buffer() {
        let (mut feed, pipeline, clock) = feed();
        pipeline.audio.push(Some(AudioChunk::new(0, 1, vec![1; 4])));
        pipeline.audio.push(Some(AudioChunk::new(2, 1, vec![1; 4])));

        let mut out = [0; 2];
        feed.render(&mut out, Duration::from_millis(500));
        assert!((clock.latency_secs() - 0.5).abs() < 1e-6);

        let mut out = [0; 6];
        feed.render(&mut out, Duration::from_millis(500));
        // Second chunk starts 2 samples (20 ms) into this buffer, expected at 80 ms
        assert!((clock.latency_secs() - 0.44).abs() < 1e-6);
    }

    #[test]
    fn test_end_of_stream_finishes() {
        let (mut feed, pipeline, _clock) = feed();
        pipeline.audio.push(Some(AudioChunk::new(0, 1, vec![3, 3])));
        pipeline.audio.push(None);

        let mut out = [9; 4];
        assert!(!feed.render(&mut out, Duration::ZERO));
        assert_eq!(out, [3, 3, 0, 0]);
        assert!(feed.is_finished());

        let mut out = [9; 4];
        assert!(!feed.render(&mut out, Duration::ZERO));
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_abort_stops_rendering() {
        let (mut feed, pipeline, _clock) = feed();
        pipeline.audio.push(Some(AudioChunk::new(0, 1, vec![1; 4])));
        pipeline.abort();

        let mut out = [9; 4];
        assert!(!feed.render(&mut out, Duration::ZERO));
        assert_eq!(out, [0; 4]);
    }
}
