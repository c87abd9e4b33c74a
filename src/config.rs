use crate::convert::FrameRate;
use crate::playback::Speed;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback configuration
    pub playback: PlaybackConfig,

    /// Audio configuration
    pub audio: AudioConfig,

    /// Video configuration
    pub video: VideoConfig,

    /// Performance tuning
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Speed used until changed, in percent (50-200)
    pub default_speed: Speed,

    /// Project frame rate
    pub frame_rate: FrameRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Play audio; when disabled the stream is only used as a clock
    pub enabled: bool,

    /// Sample rate (Hz)
    pub sample_rate: u32,

    /// Number of channels
    pub channels: u16,

    /// Fixed device buffer size in frames (device default if unset)
    pub frames_per_buffer: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Initial preview width
    pub width: u32,

    /// Initial preview height
    pub height: u32,

    /// Draw the outline of the preview area on frames
    pub show_bounding_box: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Video frame queue size
    pub video_buffer_size: usize,

    /// Audio chunk queue size
    pub audio_buffer_size: usize,

    /// Upper bound for the frame skip back-off (one second of frames if unset)
    pub max_skip_frames: Option<u32>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_speed: Speed::NORMAL,
            frame_rate: FrameRate::new(25, 1),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44100,
            channels: 2,
            frames_per_buffer: None,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            show_bounding_box: false,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            video_buffer_size: 200,
            audio_buffer_size: 1000,
            max_skip_frames: None,
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.playback.frame_rate;
        if rate.num == 0 || rate.den == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame rate {}/{}",
                rate.num, rate.den
            )));
        }
        if self.audio.sample_rate < rate.frames_per_second_ceil() {
            return Err(ConfigError::Invalid(format!(
                "sample rate {} below frame rate",
                self.audio.sample_rate
            )));
        }
        if self.audio.channels == 0 {
            return Err(ConfigError::Invalid("zero audio channels".to_string()));
        }
        if self.audio.frames_per_buffer == Some(0) {
            return Err(ConfigError::Invalid("zero frames per buffer".to_string()));
        }
        if self.performance.video_buffer_size == 0 || self.performance.audio_buffer_size == 0 {
            return Err(ConfigError::Invalid("zero queue size".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.performance.video_buffer_size, 200);
        assert_eq!(config.performance.audio_buffer_size, 1000);
        assert_eq!(config.audio.sample_rate, 44100);
        assert!(config.playback.default_speed.is_normal());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "playback": { "default_speed": 300 }, "video": { "show_bounding_box": true } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.playback.default_speed, Speed::MAX);
        assert_eq!(config.playback.frame_rate, FrameRate::new(25, 1));
        assert!(config.video.show_bounding_box);
        assert_eq!(config.video.width, 640);
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        let mut config = Config::default();
        config.performance.video_buffer_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.playback.frame_rate = FrameRate::new(25, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_round_trip() {
        let path = std::env::temp_dir().join(format!("preview-sync-config-{}.json", std::process::id()));
        let mut config = Config::default();
        config.audio.enabled = false;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
