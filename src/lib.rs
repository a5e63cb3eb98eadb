//! # Media Relay
//!
//! Real-time capture -> encode -> bounded queue -> decode -> render relay.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────── relay-producer thread ────────────────────────┐
//! │  ┌───────────────┐    ┌───────────────┐                               │
//! │  │ CaptureSource │───►│    Encoder    │── zero or more units ──┐      │
//! │  │ (tone/device) │    │  (pcm/opus)   │                        │      │
//! │  └───────────────┘    └───────────────┘                        │      │
//! └────────────────────────────────────────────────────────────────┼──────┘
//!                                                                  ▼ push (blocks when full)
//!                         ┌───────────────────────────────────────────────┐
//!                         │      BoundedUnitQueue  (capacity N, FIFO)     │
//!                         │   one mutex · not_full / not_empty condvars   │
//!                         └───────────────────────────────────────────────┘
//!                                                                  │ pop (blocks when empty)
//! ┌────────────────────── caller / relay-consumer thread ─────────┼───────┐
//! │  ┌───────────────┐    ┌───────────────┐                        │       │
//! │  │   Renderer    │◄───│    Decoder    │◄───────────────────────┘       │
//! │  │(meter/device) │    │  (pcm/opus)   │                                │
//! │  └───────────────┘    └───────────────┘                                │
//! │        relay-events helper: EventSource ── Quit ──► request_shutdown() │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shutdown is cooperative: one [`pipeline::ShutdownCoordinator`] flips the
//! running flag and wakes every thread parked in the queue. Pushes stop
//! immediately, pops keep draining until the queue is empty.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod pipeline;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default queue capacity in encoded units
    pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default Opus bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 128_000;

    /// Default encoded frame size in milliseconds
    pub const DEFAULT_FRAME_SIZE_MS: f32 = 10.0;

    /// Default capture block size in samples per channel
    pub const DEFAULT_BLOCK_SIZE: usize = 480;

    /// Default synthetic tone frequency
    pub const DEFAULT_TONE_HZ: f32 = 440.0;

    /// Default delay before retrying a not-ready capture source
    pub const DEFAULT_NOT_READY_BACKOFF_MS: u64 = 2;

    /// Default upper bound for one UI event poll
    pub const DEFAULT_EVENT_POLL_MS: u64 = 50;

    /// Default level meter summary period in frames
    pub const DEFAULT_METER_REPORT_EVERY: u64 = 100;

    /// Max encoded Opus packet we accept (max Opus frame is about 1275 bytes)
    pub const MAX_ENCODED_PACKET: usize = 4000;

    /// Capture callback blocks buffered before the producer picks them up
    pub const CAPTURE_CHANNEL_CAPACITY: usize = 64;
}
