//! Opus encoder wrapper
//!
//! Low-latency Opus encoding behind the pipeline's [`Encoder`] seam.

use bytes::Bytes;
use opus::{Application, Channels};

use crate::audio::frame::AudioFrame;
use crate::codec::{CodecSettings, FrameAccumulator};
use crate::constants::MAX_ENCODED_PACKET;
use crate::error::CodecError;
use crate::media::Encoder;
use crate::pipeline::EncodedUnit;

/// Opus encoder producing one unit per encoded frame
pub struct OpusEncoder {
    encoder: opus::Encoder,
    settings: CodecSettings,
    accumulator: FrameAccumulator,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    sequence: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create a new Opus encoder with the specified configuration
    pub fn new(settings: CodecSettings) -> Result<Self, CodecError> {
        let channels = match settings.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::EncoderInit(format!(
                    "Unsupported channel count: {}",
                    settings.channels
                )))
            }
        };

        let mut encoder = opus::Encoder::new(settings.sample_rate, channels, Application::Audio)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        Self::configure_encoder(&mut encoder, &settings)?;

        let accumulator = FrameAccumulator::new(&settings);

        Ok(Self {
            encoder,
            settings,
            accumulator,
            encode_buffer: vec![0u8; MAX_ENCODED_PACKET],
            sequence: 0,
            bytes_produced: 0,
        })
    }

    fn configure_encoder(encoder: &mut opus::Encoder, settings: &CodecSettings) -> Result<(), CodecError> {
        encoder
            .set_bitrate(opus::Bitrate::Bits(settings.bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        encoder
            .set_complexity(settings.complexity as i32)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set complexity: {}", e)))?;

        encoder
            .set_inband_fec(settings.fec)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;

        Ok(())
    }

    /// Encode exactly one frame of interleaved samples
    fn encode_frame(&mut self, samples: &[f32]) -> Result<EncodedUnit, CodecError> {
        if samples.len() != self.settings.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        let duration = self.settings.frame_duration_us();
        let unit = EncodedUnit::new(
            Bytes::copy_from_slice(&self.encode_buffer[..size]),
            self.sequence,
            self.sequence * duration,
            duration,
        );

        self.sequence += 1;
        self.bytes_produced += size as u64;
        Ok(unit)
    }

    /// Get expected total samples per frame (including all channels)
    pub fn samples_per_frame(&self) -> usize {
        self.settings.samples_per_frame()
    }

    /// Average encoded frame size in bytes
    pub fn average_frame_size(&self) -> f32 {
        if self.sequence == 0 {
            0.0
        } else {
            self.bytes_produced as f32 / self.sequence as f32
        }
    }
}

impl Encoder for OpusEncoder {
    type Input = AudioFrame;
    type Unit = EncodedUnit;

    fn encode(&mut self, frame: AudioFrame) -> Result<Vec<EncodedUnit>, CodecError> {
        let frames = self.accumulator.push(frame.channels, &frame.samples)?;
        frames.iter().map(|samples| self.encode_frame(samples)).collect()
    }

    fn flush(&mut self) -> Result<Vec<EncodedUnit>, CodecError> {
        match self.accumulator.finish() {
            Some(tail) => Ok(vec![self.encode_frame(&tail)?]),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CodecSettings {
        CodecSettings {
            sample_rate: 48000,
            channels: 2,
            frame_size: 480,
            bitrate: 128_000,
            complexity: 10,
            fec: false,
        }
    }

    #[test]
    fn test_encoding_compresses() {
        let mut encoder = OpusEncoder::new(settings()).unwrap();
        let frame_size = encoder.samples_per_frame();

        let units = encoder
            .encode(AudioFrame::new(vec![0.0f32; frame_size], 2, 0, 0))
            .unwrap();

        assert_eq!(units.len(), 1);
        assert!(!units[0].is_empty());
        assert!(units[0].size() < frame_size * 4);
    }

    #[test]
    fn test_rejects_surround() {
        let mut surround = settings();
        surround.channels = 6;
        assert!(matches!(OpusEncoder::new(surround), Err(CodecError::EncoderInit(_))));
    }
}
