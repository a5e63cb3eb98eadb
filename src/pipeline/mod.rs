//! Two-stage relay pipeline
//!
//! ```text
//!   capture ──► ProducerStage ──push──► BoundedUnitQueue ──pop──► ConsumerStage ──► render
//!               (relay-producer)              ▲  ▲               (caller / relay-consumer)
//!                                             │  │
//!                        ShutdownCoordinator ─┘  └─ wake on request_shutdown()
//! ```
//!
//! [`Pipeline`] owns the queue and the shutdown coordinator for one run,
//! starts both stages, joins them and releases whatever is left buffered.

pub mod consumer;
pub mod producer;
pub mod queue;
pub mod shutdown;
pub mod unit;

pub use consumer::{ConsumerReport, ConsumerStage, UnitSize};
pub use producer::{ProducerReport, ProducerStage};
pub use queue::{BoundedUnitQueue, PushError, QueueState, QueueStats, TryPushError};
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownWaker};
pub use unit::EncodedUnit;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::thread::JoinHandle;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::media::{CaptureSource, Decoder, Encoder, Renderer};

/// How a stage loop ended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageExit {
    /// Capture source was exhausted
    EndOfStream,
    /// Running flag was observed false
    #[default]
    Shutdown,
    /// Queue returned "no unit" after draining
    Drained,
    /// Hard error from a collaborator
    Failed(String),
}

impl StageExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, StageExit::Failed(_))
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub shutdown_reason: Option<ShutdownReason>,
    pub producer: ProducerReport,
    pub consumer: ConsumerReport,
    /// Units still buffered after both stages joined
    pub leftover_units: usize,
    pub queue: QueueStats,
}

impl PipelineReport {
    /// Turn a failed stage into an error
    pub fn into_result(self) -> Result<Self> {
        if let StageExit::Failed(message) = &self.producer.exit {
            return Err(PipelineError::StageFailed {
                stage: "producer",
                message: message.clone(),
            }
            .into());
        }
        if let StageExit::Failed(message) = &self.consumer.exit {
            return Err(PipelineError::StageFailed {
                stage: "consumer",
                message: message.clone(),
            }
            .into());
        }
        Ok(self)
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Builds and runs one producer/consumer pair around a bounded queue
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the producer on its own thread and the consumer on this one.
    /// Blocks until both stages have finished.
    pub fn run<S, E, D, R>(
        &self,
        producer: ProducerStage<S, E>,
        consumer: ConsumerStage<D, R>,
    ) -> Result<PipelineReport>
    where
        S: CaptureSource + 'static,
        E: Encoder<Input = S::Frame> + 'static,
        E::Unit: UnitSize + 'static,
        D: Decoder<Unit = E::Unit>,
        R: Renderer<Frame = D::Frame>,
    {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(self.config.queue_capacity, &shutdown)?;
        let started_at = Utc::now();

        let producer = producer.with_backoff(self.config.not_ready_backoff());
        let consumer = consumer.with_event_poll(self.config.event_poll());

        let producer_handle = producer.spawn(queue.clone())?;
        // The consumer shares the caller's thread; unwinding out of it must
        // still release the producer
        let _guard = shutdown.panic_guard();
        let consumer_result = consumer.run(&queue);
        if consumer_result.is_err() {
            shutdown.request(ShutdownReason::StageFailed);
        }

        let producer_report = join_stage(producer_handle, "producer", &shutdown)?;
        let consumer_report = consumer_result?;

        Ok(finish(started_at, &queue, producer_report, consumer_report))
    }

    /// Run both stages on dedicated threads and return immediately
    pub fn spawn<S, E, D, R>(
        &self,
        producer: ProducerStage<S, E>,
        consumer: ConsumerStage<D, R>,
    ) -> Result<RunningPipeline<E::Unit>>
    where
        S: CaptureSource + 'static,
        E: Encoder<Input = S::Frame> + 'static,
        E::Unit: UnitSize + 'static,
        D: Decoder<Unit = E::Unit> + Send + 'static,
        R: Renderer<Frame = D::Frame> + Send + 'static,
    {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(self.config.queue_capacity, &shutdown)?;
        let started_at = Utc::now();

        let producer = producer
            .with_backoff(self.config.not_ready_backoff())
            .spawn(queue.clone())?;

        let consumer = match consumer
            .with_event_poll(self.config.event_poll())
            .spawn(queue.clone())
        {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.request(ShutdownReason::StageFailed);
                let _ = producer.join();
                return Err(e.into());
            }
        };

        Ok(RunningPipeline {
            shutdown,
            queue,
            producer: Some(producer),
            consumer: Some(consumer),
            started_at,
        })
    }
}

type ConsumerHandle = JoinHandle<std::result::Result<ConsumerReport, PipelineError>>;

/// Handle to a pipeline whose stages run in the background.
///
/// Dropping it without [`join`](Self::join) requests shutdown and waits for
/// both stages.
pub struct RunningPipeline<U> {
    shutdown: ShutdownCoordinator,
    queue: BoundedUnitQueue<U>,
    producer: Option<JoinHandle<ProducerReport>>,
    consumer: Option<ConsumerHandle>,
    started_at: DateTime<Utc>,
}

impl<U> RunningPipeline<U> {
    /// Ask both stages to stop; buffered units are still drained
    pub fn shutdown(&self) -> bool {
        self.shutdown.request_shutdown()
    }

    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Wait for both stages and collect the report
    pub fn join(mut self) -> Result<PipelineReport> {
        let (Some(producer), Some(consumer)) = (self.producer.take(), self.consumer.take()) else {
            unreachable!("stage handles are only taken by join or drop");
        };

        let producer_report = join_stage(producer, "producer", &self.shutdown);
        let consumer_report = join_stage(consumer, "consumer", &self.shutdown);
        let producer_report = producer_report?;
        let consumer_report = consumer_report??;

        Ok(finish(
            self.started_at,
            &self.queue,
            producer_report,
            consumer_report,
        ))
    }
}

impl<U> Drop for RunningPipeline<U> {
    fn drop(&mut self) {
        if self.producer.is_none() && self.consumer.is_none() {
            return;
        }

        self.shutdown.request_shutdown();
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }

        let leftovers = self.queue.drain().len();
        tracing::info!("Running pipeline dropped, released {} undelivered units", leftovers);
    }
}

fn join_stage<T>(
    handle: JoinHandle<T>,
    stage: &'static str,
    shutdown: &ShutdownCoordinator,
) -> std::result::Result<T, PipelineError> {
    handle.join().map_err(|_| {
        shutdown.request(ShutdownReason::StageFailed);
        PipelineError::StagePanicked(stage)
    })
}

fn finish<U>(
    started_at: DateTime<Utc>,
    queue: &BoundedUnitQueue<U>,
    producer: ProducerReport,
    consumer: ConsumerReport,
) -> PipelineReport {
    let leftovers = queue.drain();
    let leftover_units = leftovers.len();
    if leftover_units > 0 {
        tracing::warn!("Releasing {} undelivered units", leftover_units);
    }
    drop(leftovers);

    let report = PipelineReport {
        started_at,
        finished_at: Utc::now(),
        shutdown_reason: queue.shutdown().reason(),
        producer,
        consumer,
        leftover_units,
        queue: queue.stats(),
    };

    tracing::info!(
        "Pipeline finished in {} ms ({:?}): {} units pushed, {} rendered frames, {} leftovers",
        report.elapsed().num_milliseconds(),
        report.shutdown_reason,
        report.producer.units_pushed,
        report.consumer.frames_rendered,
        report.leftover_units
    );

    report
}
