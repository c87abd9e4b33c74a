use super::{AudioChunk, TimeStretch};
use crate::convert::Pts;
use crate::model::{AudioParameters, MediaModel, ModelError};
use crate::playback::Speed;
use crate::sync::Pipeline;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Thread filling the audio queue from the model.
///
/// At normal speed chunks are queued as the model returns them. At any other
/// speed they pass through a `TimeStretch`, and the output is cut into chunks
/// of exactly one frame of playback time each, numbered from `start_pts`.
pub struct AudioProducer {
    model: Arc<dyn MediaModel>,
    pipeline: Arc<Pipeline>,
    params: AudioParameters,
    speed: Speed,
    start_pts: Pts,
}

impl AudioProducer {
    pub fn new(
        model: Arc<dyn MediaModel>,
        pipeline: Arc<Pipeline>,
        params: AudioParameters,
        speed: Speed,
        start_pts: Pts,
    ) -> Self {
        Self {
            model,
            pipeline,
            params,
            speed,
            start_pts,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("audio-producer".to_string())
            .spawn(move || self.run_guarded())
    }

    /// Any failure aborts the whole pipeline, so the video producer stops too
    fn run_guarded(self) {
        tracing::debug!("Audio producer started at {}, speed {}%", self.start_pts, self.speed.percent());
        match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(Ok(())) => tracing::debug!("Audio producer finished"),
            Ok(Err(e)) => {
                tracing::error!("Audio producer failed: {}", e);
                self.pipeline.abort();
            }
            Err(_) => {
                tracing::error!("Audio producer panicked");
                self.pipeline.abort();
            }
        }
    }

    fn run(&self) -> Result<(), ModelError> {
        if self.speed.is_normal() {
            self.run_normal()
        } else {
            self.run_stretched()
        }
    }

    fn run_normal(&self) -> Result<(), ModelError> {
        while !self.pipeline.is_aborted() {
            let chunk = self.model.next_audio(&self.params)?;
            let end = chunk.is_none();
            if !self.pipeline.audio.push(chunk) || end {
                break;
            }
        }
        Ok(())
    }

    fn run_stretched(&self) -> Result<(), ModelError> {
        let mut stretch =
            TimeStretch::new(self.params.sample_rate, self.params.channels, self.speed);
        let mut output_pts = self.start_pts;

        while !self.pipeline.is_aborted() {
            let chunk_size = self.params.chunk_size(output_pts);
            let mut samples = vec![0; chunk_size];
            let mut written = 0;

            while written < chunk_size {
                if self.pipeline.is_aborted() {
                    return Ok(());
                }
                if stretch.at_end() {
                    self.pipeline.audio.push(None);
                    return Ok(());
                } else if stretch.is_empty() {
                    stretch.send(self.model.next_audio(&self.params)?);
                } else {
                    written += stretch.receive(&mut samples[written..]);
                }
            }

            let chunk = AudioChunk::new(output_pts, self.params.channels, samples);
            if !self.pipeline.audio.push(Some(chunk)) {
                break;
            }
            output_pts += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FrameRate;
    use crate::model::{MockMediaModel, SyntheticModel};

    fn params() -> AudioParameters {
        AudioParameters::new(44100, 2, FrameRate::new(25, 1))
    }

    fn drain(pipeline: &Pipeline) -> Vec<Option<AudioChunk>> {
        let mut items = Vec::new();
        while let Some(item) = pipeline.audio.pop() {
            let end = item.is_none();
            items.push(item);
            if end {
                break;
            }
        }
        items
    }

    #[test]
    fn test_normal_speed_passes_chunks_through() {
        let model = Arc::new(SyntheticModel::new(10, FrameRate::new(25, 1)));
        let pipeline = Arc::new(Pipeline::new(4, 4));
        let handle = AudioProducer::new(model, pipeline.clone(), params(), Speed::NORMAL, 0)
            .spawn()
            .unwrap();

        let items = drain(&pipeline);
        handle.join().unwrap();

        assert_eq!(items.len(), 11);
        assert!(items[10].is_none());
        let pts: Vec<Pts> = items[..10].iter().map(|c| c.as_ref().unwrap().pts).collect();
        assert_eq!(pts, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_double_speed_halves_chunk_count() {
        let model = Arc::new(SyntheticModel::new(50, FrameRate::new(25, 1)));
        let pipeline = Arc::new(Pipeline::new(100, 4));
        let handle = AudioProducer::new(model, pipeline.clone(), params(), Speed::new(200), 7)
            .spawn()
            .unwrap();

        let items = drain(&pipeline);
        handle.join().unwrap();

        // Two seconds of content played in one second: 25 frames of output,
        // one more if the stretcher's tail overshoots by a few samples
        let chunks: Vec<AudioChunk> = items.into_iter().flatten().collect();
        assert!((25..=26).contains(&chunks.len()), "chunks = {}", chunks.len());
        let pts: Vec<Pts> = chunks.iter().map(|c| c.pts).collect();
        assert_eq!(pts, (7..7 + chunks.len() as Pts).collect::<Vec<_>>());
        assert!(chunks.iter().all(|c| c.len() == 1764 * 2));
    }

    #[test]
    fn test_model_error_aborts_pipeline() {
        let mut model = MockMediaModel::new();
        model
            .expect_next_audio()
            .returning(|_| Err(ModelError::Decode("broken".to_string())));
        let pipeline = Arc::new(Pipeline::new(4, 4));

        let handle = AudioProducer::new(Arc::new(model), pipeline.clone(), params(), Speed::NORMAL, 0)
            .spawn()
            .unwrap();
        handle.join().unwrap();

        assert!(pipeline.is_aborted());
        assert!(pipeline.video.is_closed());
        assert_eq!(pipeline.audio.pop(), None);
    }

    #[test]
    fn test_abort_unblocks_full_queue() {
        let model = Arc::new(SyntheticModel::new(1_000_000, FrameRate::new(25, 1)));
        let pipeline = Arc::new(Pipeline::new(1, 1));
        let handle = AudioProducer::new(model, pipeline.clone(), params(), Speed::new(150), 0)
            .spawn()
            .unwrap();

        while pipeline.audio.is_empty() {
            thread::yield_now();
        }
        pipeline.abort();
        handle.join().unwrap();
    }
}
