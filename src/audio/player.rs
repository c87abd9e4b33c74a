use super::{AudioError, Sample};
use crate::sync::{Clock, MonotonicClock};
use cpal::{
    Device, SampleRate, Stream, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use std::sync::Arc;
use std::time::Duration;

/// Render callback: fills the interleaved buffer for the given stream time
/// and returns false once there is nothing more to play
pub type RenderFn = Box<dyn FnMut(&mut [Sample], Duration) -> bool + Send>;

/// Stream format requested from the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Fixed device buffer size in frames; `None` leaves it to the device
    pub frames_per_buffer: Option<u32>,
}

/// Audio output stream that drives playback timing.
///
/// A stream is opened per playback run. It may be opened without being
/// started, in which case only its clock is used.
pub trait AudioOutput {
    fn open(&mut self, format: &OutputFormat, render: RenderFn) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    /// Release the stream; the render callback is dropped
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Stream time source
    fn clock(&self) -> Arc<dyn Clock>;
}

/// Output on the default cpal device
pub struct CpalOutput {
    device: Device,
    stream: Option<Stream>,
    clock: Arc<MonotonicClock>,
}

impl CpalOutput {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        tracing::info!(
            "Using audio device: {}",
            device.name().unwrap_or("Unknown".to_string())
        );

        Ok(Self {
            device,
            stream: None,
            clock: Arc::new(MonotonicClock::new()),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, format: &OutputFormat, mut render: RenderFn) -> Result<(), AudioError> {
        self.close();

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: match format.frames_per_buffer {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        self.clock.restart();
        let clock = self.clock.clone();
        let mut scratch: Vec<Sample> = Vec::new();
        let mut finished = false;

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    if finished {
                        data.fill(0.0);
                        return;
                    }

                    let timestamp = info.timestamp();
                    let delay = timestamp
                        .playback
                        .duration_since(&timestamp.callback)
                        .unwrap_or_default();

                    scratch.resize(data.len(), 0);
                    finished = !render(&mut scratch, clock.now() + delay);

                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = *sample as f32 / 32768.0;
                    }
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::Open(e.to_string()))?;

        // Some hosts start streams on creation
        if let Err(e) = stream.pause() {
            tracing::debug!("Pausing new audio stream: {}", e);
        }

        tracing::debug!(
            "Audio stream opened: {} Hz, {} channels",
            format.sample_rate,
            format.channels
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::NotOpen)?;
        stream.play().map_err(|e| AudioError::Start(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::NotOpen)?;
        stream.pause().map_err(|e| AudioError::Stop(e.to_string()))
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Audio stream closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

/// Output without a device: provides a clock but never plays anything
pub struct NullOutput {
    clock: Arc<dyn Clock>,
    open: bool,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, open: false }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for NullOutput {
    fn open(&mut self, _format: &OutputFormat, _render: RenderFn) -> Result<(), AudioError> {
        self.open = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.open {
            Ok(())
        } else {
            Err(AudioError::NotOpen)
        }
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if self.open {
            Ok(())
        } else {
            Err(AudioError::NotOpen)
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}
