//! Playback session controller.
//!
//! Owns the producer threads, the audio output and the frame scheduler. All
//! methods run on the controlling thread; the application drives the
//! scheduler by calling [`PlaybackController::poll`] whenever the deadline
//! returned by [`PlaybackController::next_deadline`] has passed.

use super::{Diagnostics, PlaybackError, PlaybackEvent, ResumeInfo, Speed};
use crate::audio::{AudioError, AudioFeed, AudioOutput, AudioProducer, OutputFormat, RenderFn};
use crate::config::Config;
use crate::convert::{FrameRate, Pts};
use crate::model::{AudioParameters, MediaModel, VideoParameters};
use crate::sync::scheduler::{self, DisplayTimer, FrameTiming, SkipBackoff};
use crate::sync::{Pipeline, PlaybackClock};
use crate::video::{VideoFrame, VideoProducer};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Delay before looking at the video queue again when it was empty
const UNDERFLOW_RETRY: Duration = Duration::from_millis(5);

pub struct PlaybackController {
    model: Arc<dyn MediaModel>,
    output: Box<dyn AudioOutput>,
    diagnostics: Arc<dyn Diagnostics>,
    config: Config,
    frame_rate: FrameRate,

    pipeline: Arc<Pipeline>,
    clock: Arc<PlaybackClock>,
    audio_thread: Option<JoinHandle<()>>,
    video_thread: Option<JoinHandle<()>>,

    timer: DisplayTimer,
    backoff: SkipBackoff,
    current_frame: Option<VideoFrame>,

    playing: bool,
    ended: bool,
    speed: Speed,
    speed_factor: f64,
    range: Option<(Pts, Pts)>,

    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(
        model: Arc<dyn MediaModel>,
        output: Box<dyn AudioOutput>,
        diagnostics: Arc<dyn Diagnostics>,
        config: Config,
    ) -> Self {
        let frame_rate = config.playback.frame_rate;
        let backoff = match config.performance.max_skip_frames {
            Some(cap) => SkipBackoff::new(cap),
            None => SkipBackoff::for_frame_rate(frame_rate),
        };
        let pipeline = Arc::new(Pipeline::new(
            config.performance.audio_buffer_size,
            config.performance.video_buffer_size,
        ));
        pipeline.set_bounding_box(config.video.width, config.video.height);
        let clock = Arc::new(PlaybackClock::new(output.clock()));
        let speed = config.playback.default_speed;
        let (events_tx, events_rx) = channel::unbounded();

        info!(
            "Playback controller: {}/{} fps, speed {}%, skip cap {}",
            frame_rate.num,
            frame_rate.den,
            speed.percent(),
            backoff.cap()
        );

        Self {
            model,
            output,
            diagnostics,
            config,
            frame_rate,
            pipeline,
            clock,
            audio_thread: None,
            video_thread: None,
            timer: DisplayTimer::default(),
            backoff,
            current_frame: None,
            playing: false,
            ended: false,
            speed,
            speed_factor: speed.factor(),
            range: None,
            events_tx,
            events_rx,
        }
    }

    /// Receiver for playback notifications
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Start playback from the frame currently shown
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.playing {
            return Ok(());
        }
        debug!("Play from {}", self.current_position());

        self.pipeline.rearm();
        self.ended = false;

        // Range playback is silent; the stream is still opened for its clock
        let start_audio = self.range.is_none() && self.config.audio.enabled;

        self.speed_factor = self.speed.factor();
        let start_pts = self.current_position();
        self.pipeline.set_start_pts(start_pts);

        let format = OutputFormat {
            sample_rate: self.config.audio.sample_rate,
            channels: self.config.audio.channels,
            frames_per_buffer: self.config.audio.frames_per_buffer,
        };

        if start_audio {
            let params = AudioParameters::new(format.sample_rate, format.channels, self.frame_rate);
            let producer = AudioProducer::new(
                self.model.clone(),
                self.pipeline.clone(),
                params,
                self.speed,
                start_pts,
            );
            match producer.spawn() {
                Ok(handle) => self.audio_thread = Some(handle),
                Err(e) => return self.abandon_start(e.into()),
            }
        }

        let producer = VideoProducer::new(
            self.model.clone(),
            self.pipeline.clone(),
            self.config.video.show_bounding_box,
        );
        match producer.spawn() {
            Ok(handle) => self.video_thread = Some(handle),
            Err(e) => return self.abandon_start(e.into()),
        }

        let mut feed = AudioFeed::new(
            self.pipeline.clone(),
            self.clock.clone(),
            self.frame_rate,
            format.sample_rate,
            format.channels,
        );
        let render: RenderFn = Box::new(move |out, playtime| feed.render(out, playtime));

        if let Err(e) = self.output.open(&format, render) {
            return self.abandon_device(e);
        }
        self.clock.mark_start();
        if start_audio {
            if let Err(e) = self.output.start() {
                self.output.close();
                return self.abandon_device(e);
            }
        }

        self.playing = true;
        self.emit(PlaybackEvent::Active(true));
        match self.range {
            Some((from, to)) => self.diagnostics.status(&format!("Playing {}..{}", from, to)),
            None => self.diagnostics.status(&format!(
                "Playing from {} at {}%",
                start_pts,
                self.speed.percent()
            )),
        }

        // First frame on the next poll
        self.timer.start_once(Duration::ZERO);
        Ok(())
    }

    fn abandon_device(&mut self, error: AudioError) -> Result<(), PlaybackError> {
        error!("Could not initialize playback: {}", error);
        self.diagnostics.device_error(&error.to_string());
        self.abandon_start(error.into())
    }

    /// Tear down a partially started run through the normal stop path
    fn abandon_start(&mut self, error: PlaybackError) -> Result<(), PlaybackError> {
        self.playing = true;
        self.stop();
        Err(error)
    }

    /// Stop playback; the current frame stays shown
    pub fn stop(&mut self) {
        self.pipeline.abort();

        if !self.playing {
            return;
        }
        debug!("Playback stopping");

        self.timer.stop();

        if self.output.is_open() {
            if let Err(e) = self.output.stop() {
                error!("Stopping audio stream: {}", e);
                self.diagnostics.device_error(&e.to_string());
            }
            self.output.close();
        }

        if let Some(handle) = self.video_thread.take() {
            if handle.join().is_err() {
                error!("Video producer thread panicked");
            }
        }
        if let Some(handle) = self.audio_thread.take() {
            if handle.join().is_err() {
                error!("Audio producer thread panicked");
            }
        }

        // A producer may have queued one more item while being unblocked
        self.pipeline.flush();

        self.playing = false;
        self.emit(PlaybackEvent::Active(false));
        self.diagnostics
            .status(&format!("Stopped at {}", self.current_position()));
        debug!("Playback stopped");
    }

    /// Stop playback, reposition the model and show the frame at `position`
    pub fn move_to(&mut self, position: Pts) {
        debug!("Move to {}", position);
        self.range = None;
        self.stop();

        // Only after the producers are joined: they read through the model's cursors
        self.model.move_to(position);
        self.emit(PlaybackEvent::Position(position));

        let (width, height) = self.pipeline.bounding_box();
        let params = VideoParameters::new(width, height)
            .with_pts(position)
            .with_bounding_box_outline(self.config.video.show_bounding_box);
        self.current_frame = if params.is_empty_area() {
            None
        } else {
            match self.model.next_video(&params) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("No preview frame at {}: {}", position, e);
                    None
                }
            }
        };
        self.emit(PlaybackEvent::Refresh);
    }

    /// Change the speed (clamped to 50-200%), restarting playback if it was active
    pub fn set_speed(&mut self, percent: u32) -> Result<(), PlaybackError> {
        let was_playing = self.playing;
        self.speed = Speed::new(percent);
        info!("Playback speed {}%", self.speed.percent());
        self.move_to(self.current_position());
        if was_playing {
            self.play()?;
        }
        Ok(())
    }

    /// Play `from..=to` in a loop, without audio
    pub fn play_range(&mut self, from: Pts, to: Pts) -> Result<(), PlaybackError> {
        if from >= to {
            return Err(PlaybackError::InvalidRange { from, to });
        }
        info!("Play range {}..{}", from, to);
        self.move_to(from);
        self.range = Some((from, to));
        self.play()
    }

    pub fn stop_range(&mut self) {
        if self.range.is_some() {
            info!("Stop range");
            self.stop();
            self.range = None;
        }
    }

    /// Stop at `position`, remembering what to restore with [`Self::resume`]
    pub fn pause(&mut self, position: Pts) -> ResumeInfo {
        let info = ResumeInfo {
            playing: self.playing,
            position,
            range: self.range,
        };
        self.move_to(position);
        info
    }

    pub fn resume(&mut self, info: ResumeInfo) -> Result<(), PlaybackError> {
        // Always reposition: the model may have changed since the pause
        self.move_to(info.position);
        if info.playing {
            self.range = info.range;
            self.play()?;
        }
        Ok(())
    }

    /// Set the preview size. A change to a non-empty size re-renders the
    /// current frame, which stops playback.
    pub fn set_bounding_box(&mut self, width: u32, height: u32) {
        if !self.pipeline.set_bounding_box(width, height) {
            return;
        }
        debug!("Bounding box {}x{}", width, height);
        if width > 0 && height > 0 {
            if let Some(position) = self.current_frame.as_ref().map(|frame| frame.pts) {
                self.move_to(position);
            }
        }
    }

    /// When the display timer is armed, the moment `poll` must be called
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Run the frame scheduler if the display timer expired at `now`.
    /// Returns true if it ran.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.timer.expire(now) {
            self.show_next_frame();
            true
        } else {
            false
        }
    }

    /// Pop the next frame and either show it and wait until the one after
    /// is due, or drop it when late
    fn show_next_frame(&mut self) {
        loop {
            if self.pipeline.is_aborted() {
                if self.playing {
                    warn!("Playback aborted");
                    self.stop();
                }
                return;
            }

            let Some(item) = self.pipeline.video.try_pop() else {
                self.timer.start_once(UNDERFLOW_RETRY);
                return;
            };
            let Some(frame) = item else {
                debug!("End of video");
                self.ended = true;
                return;
            };

            let position = frame.pts;
            if let Some((from, to)) = self.range {
                if position > to {
                    let info = self.pause(from);
                    if let Err(e) = self.resume(info) {
                        error!("Restarting range failed: {}", e);
                    }
                    return;
                }
            }

            let timing = scheduler::frame_timing(
                position,
                self.pipeline.start_pts(),
                self.speed_factor,
                self.frame_rate,
                self.clock.elapsed_secs(),
            );
            match timing {
                FrameTiming::Late => {
                    if !self.pipeline.video.is_empty() {
                        continue;
                    }
                    let skip = self.backoff.escalate(self.pipeline.skip_frames());
                    warn!(
                        "Frame {} late (start {}, latency {:.3}s), skipping {} frames",
                        position,
                        self.pipeline.start_pts(),
                        self.clock.latency_secs(),
                        skip
                    );
                    self.pipeline.set_skip_frames(skip);
                    self.timer.start_once(self.frame_rate.frame_duration());
                }
                FrameTiming::OnTime(sleep) => {
                    self.pipeline.set_skip_frames(0);
                    self.current_frame = Some(frame);
                    self.emit(PlaybackEvent::Position(position));
                    self.emit(PlaybackEvent::Refresh);
                    self.timer.start_once(sleep);
                }
            }
            return;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The last frame of the video was reached during playback
    pub fn at_end(&self) -> bool {
        self.ended
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn range(&self) -> Option<(Pts, Pts)> {
        self.range
    }

    pub fn bounding_box(&self) -> (u32, u32) {
        self.pipeline.bounding_box()
    }

    /// Position of the frame shown, 0 if there is none
    pub fn current_position(&self) -> Pts {
        self.current_frame.as_ref().map_or(0, |frame| frame.pts)
    }

    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.current_frame.as_ref()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}
