//! Error types for the media relay
//!
//! Collaborator failures are hard errors: the stage that sees one requests
//! shutdown and reports it, it never retries.

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio device error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture and render collaborator errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),

    #[error("Audio stream closed")]
    StreamClosed,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Encoder and decoder errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0} samples")]
    InvalidFrameSize(usize),

    #[error("Channel mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: u16, actual: u16 },
}

/// Errors raised by the pipeline owner and its stages
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Queue capacity must be at least 1")]
    InvalidCapacity,

    #[error("{stage} stage failed: {message}")]
    StageFailed { stage: &'static str, message: String },

    #[error("{0} stage panicked")]
    StagePanicked(&'static str),

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
