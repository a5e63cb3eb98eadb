//! Sine-tone capture source
//!
//! Stands in for a capture device: same block cadence, same frame type,
//! deterministic content. When paced to real time it reports `NotReady`
//! until the next block is due, the way a device read does before data
//! arrives.

use std::f32::consts::PI;
use std::time::{Duration, Instant};

use crate::audio::frame::AudioFrame;
use crate::config::CaptureConfig;
use crate::error::Result;
use crate::media::{Capture, CaptureSource};

/// Generates a continuous sine tone in fixed-size blocks
pub struct SyntheticSource {
    sample_rate: u32,
    channels: u16,
    block_size: usize,
    tone_hz: f32,
    amplitude: f32,
    max_frames: Option<u64>,
    realtime: bool,
    phase: f32,
    sequence: u64,
    start_time: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(sample_rate: u32, channels: u16, block_size: usize, tone_hz: f32) -> Self {
        Self {
            sample_rate,
            channels,
            block_size,
            tone_hz,
            amplitude: 0.5,
            max_frames: None,
            realtime: false,
            phase: 0.0,
            sequence: 0,
            start_time: None,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut source = Self::new(
            config.sample_rate,
            config.channels,
            config.block_size,
            config.tone_hz,
        );
        source.max_frames = config.max_frames;
        source.realtime = config.realtime;
        source
    }

    /// End the stream after `frames` blocks
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Hold each block back until its wall-clock time
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Duration of one block
    pub fn block_duration(&self) -> Duration {
        Duration::from_micros(self.block_size as u64 * 1_000_000 / self.sample_rate as u64)
    }

    fn next_block(&mut self) -> AudioFrame {
        let step = 2.0 * PI * self.tone_hz / self.sample_rate as f32;
        let mut samples = Vec::with_capacity(self.block_size * self.channels as usize);

        for _ in 0..self.block_size {
            let value = self.phase.sin() * self.amplitude;
            for _ in 0..self.channels {
                samples.push(value);
            }
            self.phase = (self.phase + step) % (2.0 * PI);
        }

        let timestamp = self.sequence * self.block_size as u64 * 1_000_000 / self.sample_rate as u64;
        let frame = AudioFrame::new(samples, self.channels, timestamp, self.sequence);
        self.sequence += 1;
        frame
    }
}

impl CaptureSource for SyntheticSource {
    type Frame = AudioFrame;

    fn next_frame(&mut self) -> Result<Capture<AudioFrame>> {
        if let Some(max) = self.max_frames {
            if self.sequence >= max {
                return Ok(Capture::EndOfStream);
            }
        }

        if self.realtime {
            let start = *self.start_time.get_or_insert_with(Instant::now);
            let due = Duration::from_micros(
                self.sequence * self.block_size as u64 * 1_000_000 / self.sample_rate as u64,
            );
            if start.elapsed() < due {
                return Ok(Capture::NotReady);
            }
        }

        Ok(Capture::Frame(self.next_block()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(capture: Capture<AudioFrame>) -> AudioFrame {
        match capture {
            Capture::Frame(frame) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_blocks_are_sequenced() {
        let mut source = SyntheticSource::new(48000, 2, 480, 440.0);

        let first = frame(source.next_frame().unwrap());
        let second = frame(source.next_frame().unwrap());

        assert_eq!(first.samples.len(), 960);
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.timestamp, 10_000);
        assert!(first.peak() <= 0.5 + 1e-6);
        assert!(first.rms() > 0.1);
    }

    #[test]
    fn test_max_frames_ends_stream() {
        let mut source = SyntheticSource::new(8000, 1, 80, 100.0).with_max_frames(2);

        frame(source.next_frame().unwrap());
        frame(source.next_frame().unwrap());
        assert!(matches!(source.next_frame().unwrap(), Capture::EndOfStream));
        assert!(matches!(source.next_frame().unwrap(), Capture::EndOfStream));
    }

    #[test]
    fn test_realtime_pacing_reports_not_ready() {
        // One-second blocks: the second block cannot be due yet
        let mut source = SyntheticSource::new(1000, 1, 1000, 10.0).with_realtime(true);

        frame(source.next_frame().unwrap());
        assert!(matches!(source.next_frame().unwrap(), Capture::NotReady));
    }

    #[test]
    fn test_pacing_survives_long_runs() {
        let mut source = SyntheticSource::new(48000, 2, 480, 440.0).with_realtime(true);
        source.start_time = Some(Instant::now());
        // Past 2^32 blocks the due time must keep growing, not wrap to zero
        source.sequence = 1 << 33;

        assert!(matches!(source.next_frame().unwrap(), Capture::NotReady));
    }
}
