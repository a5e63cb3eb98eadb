//! Uncompressed PCM packetizer
//!
//! The passthrough codec: fixed frames of little-endian f32 samples. Keeps
//! the relay runnable without any native codec library.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::audio::frame::AudioFrame;
use crate::codec::{CodecSettings, FrameAccumulator};
use crate::error::CodecError;
use crate::media::{Decoder, Encoder};
use crate::pipeline::EncodedUnit;

/// Packs audio into fixed-size PCM units
pub struct PcmEncoder {
    settings: CodecSettings,
    accumulator: FrameAccumulator,
    sequence: u64,
    bytes_produced: u64,
}

impl PcmEncoder {
    pub fn new(settings: CodecSettings) -> Self {
        let accumulator = FrameAccumulator::new(&settings);
        Self {
            settings,
            accumulator,
            sequence: 0,
            bytes_produced: 0,
        }
    }

    pub fn bytes_produced(&self) -> u64 {
        self.bytes_produced
    }

    fn pack(&mut self, samples: &[f32]) -> EncodedUnit {
        let mut payload = BytesMut::with_capacity(samples.len() * 4);
        for sample in samples {
            payload.put_f32_le(*sample);
        }

        let duration = self.settings.frame_duration_us();
        let unit = EncodedUnit::new(payload.freeze(), self.sequence, self.sequence * duration, duration);
        self.sequence += 1;
        self.bytes_produced += unit.size() as u64;
        unit
    }
}

impl Encoder for PcmEncoder {
    type Input = AudioFrame;
    type Unit = EncodedUnit;

    fn encode(&mut self, frame: AudioFrame) -> Result<Vec<EncodedUnit>, CodecError> {
        let frames = self.accumulator.push(frame.channels, &frame.samples)?;
        Ok(frames.iter().map(|samples| self.pack(samples)).collect())
    }

    fn flush(&mut self) -> Result<Vec<EncodedUnit>, CodecError> {
        Ok(self.accumulator.finish().map(|tail| self.pack(&tail)).into_iter().collect())
    }
}

/// Unpacks PCM units back into audio frames
pub struct PcmDecoder {
    channels: u16,
    frames_decoded: u64,
}

impl PcmDecoder {
    pub fn new(settings: &CodecSettings) -> Self {
        Self {
            channels: settings.channels,
            frames_decoded: 0,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl Decoder for PcmDecoder {
    type Unit = EncodedUnit;
    type Frame = AudioFrame;

    fn decode(&mut self, unit: EncodedUnit) -> Result<Vec<AudioFrame>, CodecError> {
        if unit.size() % 4 != 0 {
            return Err(CodecError::DecodingFailed(format!(
                "payload of {} bytes is not a whole number of f32 samples",
                unit.size()
            )));
        }

        let sample_count = unit.size() / 4;
        if sample_count % self.channels as usize != 0 {
            return Err(CodecError::InvalidFrameSize(sample_count));
        }

        let mut payload: Bytes = unit.payload;
        let mut samples = Vec::with_capacity(sample_count);
        while payload.has_remaining() {
            samples.push(payload.get_f32_le());
        }

        self.frames_decoded += 1;
        Ok(vec![AudioFrame::new(samples, self.channels, unit.timestamp_us, unit.sequence)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(channels: u16) -> CodecSettings {
        CodecSettings {
            sample_rate: 48000,
            channels,
            frame_size: 480,
            bitrate: 0,
            complexity: 0,
            fec: false,
        }
    }

    #[test]
    fn test_encoder_buffers_partial_blocks() {
        let mut encoder = PcmEncoder::new(settings(2));

        // 256 samples per channel: not enough for a 480 frame
        let units = encoder.encode(AudioFrame::new(vec![0.1; 512], 2, 0, 0)).unwrap();
        assert!(units.is_empty());

        let units = encoder.encode(AudioFrame::new(vec![0.2; 512], 2, 0, 1)).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].size(), 960 * 4);
        assert_eq!(units[0].sequence, 0);
        assert_eq!(units[0].duration_us, 10_000);

        let tail = encoder.flush().unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].sequence, 1);
        assert_eq!(tail[0].timestamp_us, 10_000);
        assert!(encoder.flush().unwrap().is_empty());
    }

    #[test]
    fn test_decoder_restores_samples() {
        let mut encoder = PcmEncoder::new(settings(1));
        let mut decoder = PcmDecoder::new(&settings(1));
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();

        let unit = encoder
            .encode(AudioFrame::new(samples.clone(), 1, 0, 0))
            .unwrap()
            .remove(0);
        let frames = decoder.decode(unit).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, samples);
        assert_eq!(decoder.frames_decoded(), 1);
    }

    #[test]
    fn test_decoder_rejects_torn_payloads() {
        let mut decoder = PcmDecoder::new(&settings(2));

        let torn = EncodedUnit::new(Bytes::from_static(&[0, 0, 0]), 0, 0, 0);
        assert!(matches!(decoder.decode(torn), Err(CodecError::DecodingFailed(_))));

        let odd = EncodedUnit::new(Bytes::from(vec![0u8; 12]), 0, 0, 0);
        assert!(matches!(decoder.decode(odd), Err(CodecError::InvalidFrameSize(3))));
    }
}
