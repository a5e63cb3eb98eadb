//! Audio capture from input devices
//!
//! The cpal stream lives on its own thread for its whole life; its callback
//! forwards blocks through a bounded channel that the producer stage reads.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::device::find_device;
use crate::audio::frame::AudioFrame;
use crate::config::CaptureConfig;
use crate::constants::CAPTURE_CHANNEL_CAPACITY;
use crate::error::{AudioError, Result};
use crate::media::{Capture, CaptureSource};

/// Capture source reading from a cpal input device
pub struct CpalCapture {
    frames: Receiver<AudioFrame>,
    errors: Receiver<AudioError>,
    running: Arc<AtomicBool>,
    /// Blocks dropped because the producer fell behind
    overflows: Arc<AtomicU64>,
    poll_timeout: Duration,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Open the configured device and start capturing
    pub fn open(config: &CaptureConfig, poll_timeout: Duration) -> Result<Self> {
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = config.channels;
        let device_id = config.device_id.clone();

        let (frame_tx, frame_rx) = bounded::<AudioFrame>(CAPTURE_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let overflows = Arc::new(AtomicU64::new(0));

        let running_for_loop = running.clone();
        let overflows_for_callback = overflows.clone();

        let handle = thread::Builder::new()
            .name("relay-capture".to_string())
            .spawn(move || {
                let device = match find_device(device_id.as_deref(), true) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let start_time = Instant::now();
                let mut sequence = 0u64;

                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let frame = AudioFrame::new(
                            data.to_vec(),
                            channels,
                            start_time.elapsed().as_micros() as u64,
                            sequence,
                        );
                        sequence += 1;

                        if frame_tx.try_send(frame).is_err() {
                            overflows_for_callback.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
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

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping capture
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

        tracing::info!(
            "Audio capture started: {} Hz, {} channels",
            config.sample_rate,
            config.channels
        );

        Ok(Self {
            frames: frame_rx,
            errors: error_rx,
            running,
            overflows,
            poll_timeout,
            thread_handle: Some(handle),
        })
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Audio capture stopped ({} overflowed blocks)", self.overflows());
        }
    }
}

impl CaptureSource for CpalCapture {
    type Frame = AudioFrame;

    fn next_frame(&mut self) -> Result<Capture<AudioFrame>> {
        if let Ok(e) = self.errors.try_recv() {
            return Err(e.into());
        }

        match self.frames.recv_timeout(self.poll_timeout) {
            Ok(frame) => Ok(Capture::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(Capture::NotReady),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::StreamClosed.into()),
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
