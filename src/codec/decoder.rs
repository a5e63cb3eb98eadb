//! Opus decoder wrapper

use opus::Channels;

use crate::audio::frame::AudioFrame;
use crate::codec::CodecSettings;
use crate::error::CodecError;
use crate::media::Decoder;
use crate::pipeline::EncodedUnit;

/// Opus decoder producing one frame per unit
pub struct OpusDecoder {
    decoder: opus::Decoder,
    channels: u16,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<f32>,
    frames_decoded: u64,
}

impl OpusDecoder {
    pub fn new(settings: &CodecSettings) -> Result<Self, CodecError> {
        let opus_channels = match settings.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    settings.channels
                )))
            }
        };

        let decoder = opus::Decoder::new(settings.sample_rate, opus_channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        // Room for the longest Opus frame (120 ms)
        let max_samples = settings.sample_rate as usize * settings.channels as usize * 120 / 1000;

        Ok(Self {
            decoder,
            channels: settings.channels,
            decode_buffer: vec![0.0f32; max_samples],
            frames_decoded: 0,
        })
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl Decoder for OpusDecoder {
    type Unit = EncodedUnit;
    type Frame = AudioFrame;

    fn decode(&mut self, unit: EncodedUnit) -> Result<Vec<AudioFrame>, CodecError> {
        let per_channel = self
            .decoder
            .decode_float(&unit.payload, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        let total = per_channel * self.channels as usize;
        self.frames_decoded += 1;

        Ok(vec![AudioFrame::new(
            self.decode_buffer[..total].to_vec(),
            self.channels,
            unit.timestamp_us,
            unit.sequence,
        )])
    }
}
