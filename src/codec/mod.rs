//! Codec wrappers
//!
//! Every codec here consumes [`AudioFrame`]s of any block size, re-chunks
//! them into fixed encoded frames and produces [`EncodedUnit`]s.
//!
//! [`AudioFrame`]: crate::audio::AudioFrame
//! [`EncodedUnit`]: crate::pipeline::EncodedUnit

pub mod pcm;

#[cfg(feature = "opus-codec")]
pub mod decoder;
#[cfg(feature = "opus-codec")]
pub mod encoder;

pub use pcm::{PcmDecoder, PcmEncoder};

#[cfg(feature = "opus-codec")]
pub use decoder::OpusDecoder;
#[cfg(feature = "opus-codec")]
pub use encoder::OpusEncoder;

use crate::config::AppConfig;
use crate::error::CodecError;

/// Parameters shared by encoders and decoders
#[derive(Debug, Clone, PartialEq)]
pub struct CodecSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in one encoded frame
    pub frame_size: usize,
    pub bitrate: u32,
    pub complexity: u8,
    pub fec: bool,
}

impl CodecSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sample_rate: config.capture.sample_rate,
            channels: config.capture.channels,
            frame_size: config.codec.frame_size(config.capture.sample_rate),
            bitrate: config.codec.bitrate,
            complexity: config.codec.complexity,
            fec: config.codec.fec,
        }
    }

    /// Total interleaved samples in one encoded frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    /// Encoded frame duration in microseconds
    pub fn frame_duration_us(&self) -> u64 {
        self.frame_size as u64 * 1_000_000 / self.sample_rate as u64
    }

    /// Frame duration in milliseconds
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size as f32 * 1000.0 / self.sample_rate as f32
    }
}

/// Re-chunks incoming interleaved samples into fixed-size frames.
///
/// Capture blocks rarely line up with codec frames, so encoders buffer the
/// remainder until the next block arrives.
#[derive(Debug)]
pub(crate) struct FrameAccumulator {
    channels: u16,
    samples_per_frame: usize,
    pending: Vec<f32>,
}

impl FrameAccumulator {
    pub(crate) fn new(settings: &CodecSettings) -> Self {
        Self {
            channels: settings.channels,
            samples_per_frame: settings.samples_per_frame(),
            pending: Vec::with_capacity(settings.samples_per_frame() * 2),
        }
    }

    /// Append a block and return every complete frame now available
    pub(crate) fn push(&mut self, channels: u16, samples: &[f32]) -> Result<Vec<Vec<f32>>, CodecError> {
        if channels != self.channels {
            return Err(CodecError::ChannelMismatch {
                expected: self.channels,
                actual: channels,
            });
        }

        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.samples_per_frame {
            frames.push(self.pending.drain(..self.samples_per_frame).collect());
        }
        Ok(frames)
    }

    /// Pad the partial tail with silence, if there is one
    pub(crate) fn finish(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut tail = std::mem::take(&mut self.pending);
        tail.resize(self.samples_per_frame, 0.0);
        Some(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CodecSettings {
        CodecSettings {
            sample_rate: 48000,
            channels: 2,
            frame_size: 4,
            bitrate: 128_000,
            complexity: 10,
            fec: false,
        }
    }

    #[test]
    fn test_accumulator_rechunks() {
        let mut acc = FrameAccumulator::new(&settings());

        assert!(acc.push(2, &[0.0; 6]).unwrap().is_empty());
        let frames = acc.push(2, &[1.0; 12]).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 8));

        let tail = acc.finish().unwrap();
        assert_eq!(tail.len(), 8);
        assert_eq!(&tail[..2], &[1.0, 1.0]);
        assert_eq!(&tail[2..], &[0.0; 6]);
        assert!(acc.finish().is_none());
    }

    #[test]
    fn test_accumulator_rejects_channel_change() {
        let mut acc = FrameAccumulator::new(&settings());
        let err = acc.push(1, &[0.0; 4]).unwrap_err();
        assert!(matches!(err, CodecError::ChannelMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = CodecSettings::from_config(&AppConfig::default());
        assert_eq!(settings.frame_size, 480);
        assert_eq!(settings.samples_per_frame(), 960);
        assert_eq!(settings.frame_duration_us(), 10_000);
    }
}
