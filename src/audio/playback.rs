//! Audio playback on output devices
//!
//! The renderer side only appends to a shared sample FIFO; the cpal output
//! callback pulls from it and plays silence on underrun.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::find_device;
use crate::audio::frame::AudioFrame;
use crate::error::{AudioError, Result};
use crate::media::Renderer;

/// How much audio the FIFO may hold before old samples are dropped
const MAX_BUFFERED_MS: usize = 200;

/// Renderer playing decoded frames on a cpal output device
pub struct CpalPlayback {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    max_buffered: usize,
    channels: u16,
    running: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
    overflows: u64,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    pub fn open(device_id: Option<&str>, sample_rate: u32, channels: u16) -> Result<Self> {
        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let max_buffered = sample_rate as usize * channels as usize * MAX_BUFFERED_MS / 1000;

        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(max_buffered)));
        let running = Arc::new(AtomicBool::new(true));
        let underruns = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), AudioError>>(1);

        let buffer_for_callback = buffer.clone();
        let underruns_for_callback = underruns.clone();
        let running_for_loop = running.clone();
        let device_id = device_id.map(str::to_string);

        let handle = thread::Builder::new()
            .name("relay-playback".to_string())
            .spawn(move || {
                let device = match find_device(device_id.as_deref(), false) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut buffer = buffer_for_callback.lock();
                        let mut starved = false;
                        for sample in data.iter_mut() {
                            *sample = match buffer.pop_front() {
                                Some(s) => s,
                                None => {
                                    starved = true;
                                    0.0
                                }
                            };
                        }
                        if starved {
                            underruns_for_callback.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        tracing::error!("Playback stream error: {}", err);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamClosed.into());
            }
        }

        tracing::info!("Playback started: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            buffer,
            max_buffered,
            channels,
            running,
            underruns,
            overflows: 0,
            thread_handle: Some(handle),
        })
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Renderer for CpalPlayback {
    type Frame = AudioFrame;

    fn render(&mut self, frame: AudioFrame) {
        if frame.channels != self.channels {
            tracing::warn!(
                "Dropping frame with {} channels on a {} channel output",
                frame.channels,
                self.channels
            );
            return;
        }

        let mut buffer = self.buffer.lock();
        buffer.extend(frame.samples);
        if buffer.len() > self.max_buffered {
            let excess = buffer.len() - self.max_buffered;
            buffer.drain(..excess);
            self.overflows += 1;
        }
    }

    fn finish(&mut self) {
        self.stop();
        tracing::info!(
            "Playback finished: {} underruns, {} overflows",
            self.underruns(),
            self.overflows
        );
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
