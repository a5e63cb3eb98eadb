//! Producer stage: capture -> encode -> push
//!
//! Runs on its own thread. Owns the capture source and the encoder; the
//! only shared state it touches is the queue (through `push`) and the
//! running flag.

use serde::Serialize;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::constants::DEFAULT_NOT_READY_BACKOFF_MS;
use crate::error::{Error, PipelineError};
use crate::media::{Capture, CaptureSource, Encoder};
use crate::pipeline::queue::{BoundedUnitQueue, PushError};
use crate::pipeline::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::pipeline::StageExit;

/// What the producer did before it exited
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProducerReport {
    pub frames_captured: u64,
    pub units_produced: u64,
    pub units_pushed: u64,
    /// Units released locally because shutdown refused them
    pub units_discarded: u64,
    pub not_ready_retries: u64,
    pub exit: StageExit,
}

/// Capture/encode loop feeding a [`BoundedUnitQueue`]
pub struct ProducerStage<S, E> {
    source: S,
    encoder: E,
    backoff: Duration,
}

impl<S, E> ProducerStage<S, E>
where
    S: CaptureSource,
    E: Encoder<Input = S::Frame>,
{
    pub fn new(source: S, encoder: E) -> Self {
        Self {
            source,
            encoder,
            backoff: Duration::from_millis(DEFAULT_NOT_READY_BACKOFF_MS),
        }
    }

    /// Delay before asking a not-ready source again
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run the loop on the current thread until end of stream, shutdown or
    /// a hard error.
    pub fn run(self, queue: &BoundedUnitQueue<E::Unit>) -> ProducerReport {
        let Self {
            mut source,
            mut encoder,
            backoff,
        } = self;
        let shutdown = queue.shutdown().clone();
        let mut report = ProducerReport::default();

        tracing::info!("Producer stage started (queue capacity {})", queue.capacity());

        report.exit = loop {
            if !shutdown.is_running() {
                break StageExit::Shutdown;
            }

            match source.next_frame() {
                Ok(Capture::Frame(frame)) => {
                    report.frames_captured += 1;
                    match encoder.encode(frame) {
                        Ok(units) => {
                            if !push_all(queue, units, &mut report) {
                                break StageExit::Shutdown;
                            }
                        }
                        Err(e) => break fail(&shutdown, e.into()),
                    }
                }
                Ok(Capture::NotReady) => {
                    report.not_ready_retries += 1;
                    if backoff.is_zero() {
                        thread::yield_now();
                    } else {
                        thread::sleep(backoff);
                    }
                }
                Ok(Capture::EndOfStream) => {
                    tracing::info!(
                        "Capture source ended after {} frames",
                        report.frames_captured
                    );
                    match encoder.flush() {
                        Ok(units) => {
                            push_all(queue, units, &mut report);
                        }
                        Err(e) => break fail(&shutdown, e.into()),
                    }
                    shutdown.request(ShutdownReason::EndOfStream);
                    break StageExit::EndOfStream;
                }
                Err(e) => break fail(&shutdown, e),
            }
        };

        // Codec and device resources are private to this stage
        drop(encoder);
        drop(source);

        tracing::info!(
            "Producer stage stopped ({:?}): {} frames captured, {} units pushed, {} discarded",
            report.exit,
            report.frames_captured,
            report.units_pushed,
            report.units_discarded
        );

        report
    }
}

impl<S, E> ProducerStage<S, E>
where
    S: CaptureSource + 'static,
    E: Encoder<Input = S::Frame> + 'static,
    E::Unit: 'static,
{
    /// Run the loop on a dedicated `relay-producer` thread
    pub fn spawn(
        self,
        queue: BoundedUnitQueue<E::Unit>,
    ) -> Result<JoinHandle<ProducerReport>, PipelineError> {
        thread::Builder::new()
            .name("relay-producer".to_string())
            .spawn(move || {
                let _guard = queue.shutdown().panic_guard();
                self.run(&queue)
            })
            .map_err(|e| PipelineError::ThreadSpawn(e.to_string()))
    }
}

/// Push a batch in order. Returns `false` once shutdown refuses a unit; that
/// unit and the rest of the batch are released here.
fn push_all<U>(
    queue: &BoundedUnitQueue<U>,
    units: Vec<U>,
    report: &mut ProducerReport,
) -> bool {
    let mut units = units.into_iter();

    while let Some(unit) = units.next() {
        report.units_produced += 1;
        match queue.push(unit) {
            Ok(()) => report.units_pushed += 1,
            Err(PushError(refused)) => {
                drop(refused);
                let rest = units.count() as u64;
                report.units_produced += rest;
                report.units_discarded += 1 + rest;
                tracing::warn!("Queue shut down, discarded {} pending units", 1 + rest);
                return false;
            }
        }
    }

    true
}

fn fail(shutdown: &ShutdownCoordinator, error: Error) -> StageExit {
    tracing::error!("Producer stage failed: {}", error);
    shutdown.request(ShutdownReason::StageFailed);
    StageExit::Failed(error.to_string())
}
