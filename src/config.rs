//! Application configuration
//!
//! Loaded from TOML. Every section and field has a default, so an empty file
//! (or no file at all) yields a runnable synthetic-tone relay.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub capture: CaptureConfig,
    pub codec: CodecConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

/// Queue and stage tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of encoded units the queue can hold
    pub queue_capacity: usize,
    /// Delay before retrying a not-ready capture source
    pub not_ready_backoff_ms: u64,
    /// Max wait per UI event poll
    pub event_poll_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            not_ready_backoff_ms: DEFAULT_NOT_READY_BACKOFF_MS,
            event_poll_ms: DEFAULT_EVENT_POLL_MS,
        }
    }
}

impl PipelineConfig {
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..Default::default()
        }
    }

    pub fn not_ready_backoff(&self) -> Duration {
        Duration::from_millis(self.not_ready_backoff_ms)
    }

    pub fn event_poll(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Generated sine tone
    Synthetic,
    /// Live input device
    Device,
}

/// Capture source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// Device ID as printed by `relay --list-devices`; default device if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in each captured block
    pub block_size: usize,
    /// Synthetic tone frequency
    pub tone_hz: f32,
    /// Stop after this many blocks (synthetic only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frames: Option<u64>,
    /// Pace synthetic capture to wall-clock time
    pub realtime: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            device_id: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            tone_hz: DEFAULT_TONE_HZ,
            max_frames: None,
            realtime: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Raw little-endian f32 packets
    Pcm,
    /// Opus (requires the `opus-codec` feature)
    Opus,
}

/// Encoder/decoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub kind: CodecKind,
    /// Encoded frame duration
    pub frame_size_ms: f32,
    /// Opus bitrate in bits per second
    pub bitrate: u32,
    /// Opus complexity (0-10)
    pub complexity: u8,
    /// Opus in-band forward error correction
    pub fec: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            kind: CodecKind::Pcm,
            frame_size_ms: DEFAULT_FRAME_SIZE_MS,
            bitrate: DEFAULT_BITRATE,
            complexity: 10,
            fec: false,
        }
    }
}

impl CodecConfig {
    /// Samples per channel in one encoded frame
    pub fn frame_size(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 * self.frame_size_ms / 1000.0) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    /// Log signal levels
    Meter,
    /// Count and discard
    Null,
    /// Play on an output device
    Device,
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub kind: RenderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Meter summary period in frames
    pub report_every: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            kind: RenderKind::Meter,
            device_id: None,
            report_every: DEFAULT_METER_REPORT_EVERY,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Print the final run report as JSON on stdout
    pub json_report: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_report: false,
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location, or fall back to
    /// defaults when no file exists there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<config dir>/media-relay/relay.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "media-relay").map(|dirs| dirs.config_dir().join("relay.toml"))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.queue_capacity == 0 {
            return Err(Error::Config("pipeline.queue_capacity must be at least 1".into()));
        }
        if self.pipeline.event_poll_ms == 0 {
            return Err(Error::Config("pipeline.event_poll_ms must be at least 1".into()));
        }
        if self.capture.sample_rate == 0 {
            return Err(Error::Config("capture.sample_rate must be positive".into()));
        }
        if self.capture.channels == 0 {
            return Err(Error::Config("capture.channels must be positive".into()));
        }
        if self.capture.block_size == 0 {
            return Err(Error::Config("capture.block_size must be positive".into()));
        }
        if !(self.codec.frame_size_ms > 0.0) {
            return Err(Error::Config("codec.frame_size_ms must be positive".into()));
        }
        if self.codec.frame_size(self.capture.sample_rate) == 0 {
            return Err(Error::Config(format!(
                "codec.frame_size_ms {} is shorter than one sample at {} Hz",
                self.codec.frame_size_ms, self.capture.sample_rate
            )));
        }
        if self.codec.complexity > 10 {
            return Err(Error::Config("codec.complexity must be 0-10".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.pipeline.queue_capacity, 8);
        assert_eq!(config.codec.frame_size(48000), 480);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [pipeline]
            queue_capacity = 2

            [capture]
            source = "synthetic"
            channels = 1
            max_frames = 100
            realtime = false

            [codec]
            kind = "opus"
            bitrate = 64000

            [render]
            kind = "null"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.queue_capacity, 2);
        assert_eq!(config.pipeline.event_poll_ms, DEFAULT_EVENT_POLL_MS);
        assert_eq!(config.capture.channels, 1);
        assert_eq!(config.capture.max_frames, Some(100));
        assert_eq!(config.codec.kind, CodecKind::Opus);
        assert_eq!(config.codec.bitrate, 64000);
        assert_eq!(config.render.kind, RenderKind::Null);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let err = AppConfig::from_toml("[pipeline]\nqueue_capacity = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation_rejects_zero_event_poll() {
        let err = AppConfig::from_toml("[pipeline]\nevent_poll_ms = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation_rejects_tiny_frames() {
        let mut config = AppConfig::default();
        config.capture.sample_rate = 8000;
        config.codec.frame_size_ms = 0.05;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let err = AppConfig::from_toml("[render]\nkind = \"window\"\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = AppConfig::default().to_toml().unwrap();
        assert_eq!(AppConfig::from_toml(&text).unwrap(), AppConfig::default());
    }
}
