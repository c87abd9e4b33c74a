use crate::model::{MediaModel, ModelError, VideoParameters};
use crate::sync::Pipeline;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Thread filling the video queue from the model.
///
/// While the scheduler asks for frames to be skipped, frames are requested
/// decode-only and dropped instead of queued.
pub struct VideoProducer {
    model: Arc<dyn MediaModel>,
    pipeline: Arc<Pipeline>,
    draw_bounding_box: bool,
}

impl VideoProducer {
    pub fn new(model: Arc<dyn MediaModel>, pipeline: Arc<Pipeline>, draw_bounding_box: bool) -> Self {
        Self {
            model,
            pipeline,
            draw_bounding_box,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("video-producer".to_string())
            .spawn(move || self.run_guarded())
    }

    fn run_guarded(self) {
        tracing::debug!("Video producer started");
        match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(Ok(())) => tracing::debug!("Video producer finished"),
            Ok(Err(e)) => {
                tracing::error!("Video producer failed: {}", e);
                self.pipeline.abort();
            }
            Err(_) => {
                tracing::error!("Video producer panicked");
                self.pipeline.abort();
            }
        }
    }

    fn run(&self) -> Result<(), ModelError> {
        while !self.pipeline.is_aborted() {
            let skip = self.pipeline.skip_frames();
            let (width, height) = self.pipeline.bounding_box();
            let params = VideoParameters::new(width, height)
                .with_skip(skip > 0)
                .with_bounding_box_outline(self.draw_bounding_box);

            let frame = self.model.next_video(&params)?;
            if skip > 0 && frame.is_some() {
                self.pipeline.consume_skip(skip);
                continue;
            }

            let end = frame.is_none();
            if !self.pipeline.video.push(frame) || end {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{FrameRate, Pts};
    use crate::model::{MockMediaModel, SyntheticModel};
    use crate::video::VideoFrame;

    fn drain(pipeline: &Pipeline) -> Vec<Pts> {
        let mut positions = Vec::new();
        while let Some(Some(frame)) = pipeline.video.pop() {
            positions.push(frame.pts);
        }
        positions
    }

    #[test]
    fn test_frames_in_order_then_end() {
        let model = Arc::new(SyntheticModel::new(20, FrameRate::new(25, 1)));
        let pipeline = Arc::new(Pipeline::new(4, 4));
        pipeline.set_bounding_box(16, 9);

        let handle = VideoProducer::new(model, pipeline.clone(), false).spawn().unwrap();
        let positions = drain(&pipeline);
        handle.join().unwrap();

        assert_eq!(positions, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_skipped_frames_are_not_queued() {
        let model = Arc::new(SyntheticModel::new(20, FrameRate::new(25, 1)));
        let pipeline = Arc::new(Pipeline::new(4, 30));
        pipeline.set_skip_frames(5);

        let handle = VideoProducer::new(model, pipeline.clone(), false).spawn().unwrap();
        handle.join().unwrap();

        assert_eq!(pipeline.skip_frames(), 0);
        assert_eq!(drain(&pipeline), (5..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_parameters_carry_box_and_outline() {
        let mut model = MockMediaModel::new();
        let mut calls = 0;
        model
            .expect_next_video()
            .withf(|params| params.bounding_box == (64, 36) && params.draw_bounding_box && !params.skip)
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok(Some(VideoFrame::new(0, 64, 36, vec![0; 64 * 36 * 4])))
                } else {
                    Ok(None)
                }
            });

        let pipeline = Arc::new(Pipeline::new(4, 4));
        pipeline.set_bounding_box(64, 36);
        let handle = VideoProducer::new(Arc::new(model), pipeline.clone(), true).spawn().unwrap();
        handle.join().unwrap();

        assert_eq!(drain(&pipeline), vec![0]);
    }

    struct PanickingModel;

    impl MediaModel for PanickingModel {
        fn next_audio(
            &self,
            _params: &crate::model::AudioParameters,
        ) -> Result<Option<crate::audio::AudioChunk>, ModelError> {
            Ok(None)
        }

        fn next_video(&self, _params: &VideoParameters) -> Result<Option<VideoFrame>, ModelError> {
            panic!("model exploded")
        }

        fn move_to(&self, _position: Pts) {}
    }

    #[test]
    fn test_panic_in_model_aborts_pipeline() {
        let pipeline = Arc::new(Pipeline::new(4, 4));
        let handle = VideoProducer::new(Arc::new(PanickingModel), pipeline.clone(), false)
            .spawn()
            .unwrap();
        handle.join().unwrap();

        assert!(pipeline.is_aborted());
        assert!(pipeline.audio.is_closed());
    }
}
