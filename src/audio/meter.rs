//! Level-meter renderer
//!
//! Headless stand-in for a presentation surface: measures every frame and
//! logs a summary periodically.

use serde::Serialize;

use crate::audio::frame::{to_dbfs, AudioFrame};
use crate::media::Renderer;

/// Totals gathered by a [`MeterRenderer`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeterStats {
    pub frames: u64,
    pub samples: u64,
    /// Highest peak seen, linear
    pub peak: f32,
    /// Sequence gaps observed between consecutive frames
    pub discontinuities: u64,
}

/// Logs RMS/peak levels every `report_every` frames
pub struct MeterRenderer {
    report_every: u64,
    stats: MeterStats,
    window_peak: f32,
    window_sum_sq: f64,
    window_samples: u64,
    last_sequence: Option<u64>,
}

impl MeterRenderer {
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
            stats: MeterStats::default(),
            window_peak: 0.0,
            window_sum_sq: 0.0,
            window_samples: 0,
            last_sequence: None,
        }
    }

    pub fn stats(&self) -> &MeterStats {
        &self.stats
    }

    fn report_window(&mut self) {
        if self.window_samples == 0 {
            return;
        }
        let rms = (self.window_sum_sq / self.window_samples as f64).sqrt() as f32;
        tracing::info!(
            "Level: rms {:.1} dBFS, peak {:.1} dBFS ({} frames rendered)",
            to_dbfs(rms),
            to_dbfs(self.window_peak),
            self.stats.frames
        );
        self.window_peak = 0.0;
        self.window_sum_sq = 0.0;
        self.window_samples = 0;
    }
}

impl Renderer for MeterRenderer {
    type Frame = AudioFrame;

    fn render(&mut self, frame: AudioFrame) {
        if let Some(last) = self.last_sequence {
            if frame.sequence != last.wrapping_add(1) {
                self.stats.discontinuities += 1;
                tracing::debug!("Sequence jump {} -> {}", last, frame.sequence);
            }
        }
        self.last_sequence = Some(frame.sequence);

        let peak = frame.peak();
        self.stats.frames += 1;
        self.stats.samples += frame.samples.len() as u64;
        self.stats.peak = self.stats.peak.max(peak);

        self.window_peak = self.window_peak.max(peak);
        self.window_sum_sq += frame.samples.iter().map(|s| (*s as f64) * (*s as f64)).sum::<f64>();
        self.window_samples += frame.samples.len() as u64;

        if self.stats.frames % self.report_every == 0 {
            self.report_window();
        }
    }

    fn finish(&mut self) {
        self.report_window();
        tracing::info!(
            "Meter finished: {} frames, {} samples, peak {:.1} dBFS, {} discontinuities",
            self.stats.frames,
            self.stats.samples,
            to_dbfs(self.stats.peak),
            self.stats.discontinuities
        );
    }
}

/// Counts frames and drops them
#[derive(Debug, Default)]
pub struct NullRenderer {
    frames: u64,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for NullRenderer {
    type Frame = AudioFrame;

    fn render(&mut self, _frame: AudioFrame) {
        self.frames += 1;
    }

    fn finish(&mut self) {
        tracing::info!("Discarded {} rendered frames", self.frames);
    }
}
