//! Collaborator seams of the pipeline
//!
//! The stages only see these traits. Capture devices, codecs, renderers and
//! UI event loops plug in behind them.

use std::time::Duration;

use crate::error::{CodecError, Result};

/// Outcome of asking a capture source for its next frame
#[derive(Debug)]
pub enum Capture<F> {
    Frame(F),
    /// Nothing available yet; ask again later
    NotReady,
    /// Source is exhausted
    EndOfStream,
}

/// Produces raw frames on demand
pub trait CaptureSource: Send {
    type Frame: Send;

    /// Fetch the next raw frame. `Err` is a hard failure.
    fn next_frame(&mut self) -> Result<Capture<Self::Frame>>;
}

/// Turns raw frames into encoded units, possibly buffering internally
pub trait Encoder: Send {
    type Input;
    type Unit: Send;

    fn encode(&mut self, frame: Self::Input) -> std::result::Result<Vec<Self::Unit>, CodecError>;

    /// Emit whatever is still buffered at end of stream
    fn flush(&mut self) -> std::result::Result<Vec<Self::Unit>, CodecError> {
        Ok(Vec::new())
    }
}

/// Turns encoded units back into presentable frames
pub trait Decoder {
    type Unit;
    type Frame;

    fn decode(&mut self, unit: Self::Unit) -> std::result::Result<Vec<Self::Frame>, CodecError>;

    fn flush(&mut self) -> std::result::Result<Vec<Self::Frame>, CodecError> {
        Ok(Vec::new())
    }
}

/// Presents decoded frames
pub trait Renderer {
    type Frame;

    fn render(&mut self, frame: Self::Frame);

    /// Called once after the last frame
    fn finish(&mut self) {}
}

/// Events coming from the UI / control side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Quit,
    Other(String),
}

/// Lazy source of UI events, polled from a helper thread
pub trait EventSource: Send {
    /// Wait up to `timeout` for the next event
    fn wait_event(&mut self, timeout: Duration) -> Option<UiEvent>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    type Frame = S::Frame;

    fn next_frame(&mut self) -> Result<Capture<Self::Frame>> {
        (**self).next_frame()
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    type Input = E::Input;
    type Unit = E::Unit;

    fn encode(&mut self, frame: Self::Input) -> std::result::Result<Vec<Self::Unit>, CodecError> {
        (**self).encode(frame)
    }

    fn flush(&mut self) -> std::result::Result<Vec<Self::Unit>, CodecError> {
        (**self).flush()
    }
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    type Unit = D::Unit;
    type Frame = D::Frame;

    fn decode(&mut self, unit: Self::Unit) -> std::result::Result<Vec<Self::Frame>, CodecError> {
        (**self).decode(unit)
    }

    fn flush(&mut self) -> std::result::Result<Vec<Self::Frame>, CodecError> {
        (**self).flush()
    }
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    type Frame = R::Frame;

    fn render(&mut self, frame: Self::Frame) {
        (**self).render(frame)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn wait_event(&mut self, timeout: Duration) -> Option<UiEvent> {
        (**self).wait_event(timeout)
    }
}
