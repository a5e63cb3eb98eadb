//! Consumer stage: pop -> decode -> render
//!
//! Runs on the caller's thread or a dedicated one. A helper thread watches
//! the UI event source so a quit request reaches the running flag even
//! while the consumer is parked in `pop`.

use serde::Serialize;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::constants::DEFAULT_EVENT_POLL_MS;
use crate::error::{Error, PipelineError};
use crate::media::{Decoder, EventSource, Renderer, UiEvent};
use crate::pipeline::queue::BoundedUnitQueue;
use crate::pipeline::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::pipeline::StageExit;

/// What the consumer did before it exited
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumerReport {
    pub units_received: u64,
    pub bytes_received: u64,
    pub frames_decoded: u64,
    pub frames_rendered: u64,
    pub exit: StageExit,
}

/// Implemented by units that know their payload size
pub trait UnitSize {
    fn unit_size(&self) -> usize;
}

impl UnitSize for crate::pipeline::EncodedUnit {
    fn unit_size(&self) -> usize {
        self.size()
    }
}

/// Pop/decode/render loop draining a [`BoundedUnitQueue`]
pub struct ConsumerStage<D, R> {
    decoder: D,
    renderer: R,
    events: Option<Box<dyn EventSource>>,
    event_poll: Duration,
}

impl<D, R> ConsumerStage<D, R>
where
    D: Decoder,
    D::Unit: UnitSize,
    R: Renderer<Frame = D::Frame>,
{
    pub fn new(decoder: D, renderer: R) -> Self {
        Self {
            decoder,
            renderer,
            events: None,
            event_poll: Duration::from_millis(DEFAULT_EVENT_POLL_MS),
        }
    }

    /// Watch `events` for a quit request while consuming
    pub fn with_events(mut self, events: impl EventSource + 'static) -> Self {
        self.events = Some(Box::new(events));
        self
    }

    /// Upper bound on how long the event watcher waits per poll
    pub fn with_event_poll(mut self, poll: Duration) -> Self {
        self.event_poll = poll;
        self
    }

    /// Consume until the queue reports end of stream or decoding fails.
    ///
    /// Only fails if the event watcher thread cannot be started.
    pub fn run(self, queue: &BoundedUnitQueue<D::Unit>) -> Result<ConsumerReport, PipelineError> {
        let Self {
            mut decoder,
            mut renderer,
            events,
            event_poll,
        } = self;
        let shutdown = queue.shutdown().clone();
        let mut report = ConsumerReport::default();

        let watcher = match events {
            Some(events) => Some(EventWatcher::spawn(events, shutdown.clone(), event_poll)?),
            None => None,
        };

        tracing::info!("Consumer stage started");

        report.exit = loop {
            let Some(unit) = queue.pop() else {
                // Drained: whatever the decoder still holds is the tail
                match decoder.flush() {
                    Ok(frames) => render_all(&mut renderer, frames, &mut report),
                    Err(e) => break fail(&shutdown, e.into()),
                }
                break StageExit::Drained;
            };

            report.units_received += 1;
            report.bytes_received += unit.unit_size() as u64;

            // Ownership ends here; the decoder releases the unit
            match decoder.decode(unit) {
                Ok(frames) => render_all(&mut renderer, frames, &mut report),
                Err(e) => break fail(&shutdown, e.into()),
            }
        };

        renderer.finish();

        if let Some(watcher) = watcher {
            watcher.join();
        }

        tracing::info!(
            "Consumer stage stopped ({:?}): {} units received, {} frames rendered",
            report.exit,
            report.units_received,
            report.frames_rendered
        );

        Ok(report)
    }
}

impl<D, R> ConsumerStage<D, R>
where
    D: Decoder + Send + 'static,
    D::Unit: UnitSize + Send + 'static,
    R: Renderer<Frame = D::Frame> + Send + 'static,
{
    /// Run the loop on a dedicated `relay-consumer` thread
    pub fn spawn(
        self,
        queue: BoundedUnitQueue<D::Unit>,
    ) -> Result<JoinHandle<Result<ConsumerReport, PipelineError>>, PipelineError> {
        thread::Builder::new()
            .name("relay-consumer".to_string())
            .spawn(move || {
                let _guard = queue.shutdown().panic_guard();
                self.run(&queue)
            })
            .map_err(|e| PipelineError::ThreadSpawn(e.to_string()))
    }
}

fn render_all<R: Renderer>(renderer: &mut R, frames: Vec<R::Frame>, report: &mut ConsumerReport) {
    for frame in frames {
        report.frames_decoded += 1;
        renderer.render(frame);
        report.frames_rendered += 1;
    }
}

fn fail(shutdown: &ShutdownCoordinator, error: Error) -> StageExit {
    tracing::error!("Consumer stage failed: {}", error);
    shutdown.request(ShutdownReason::StageFailed);
    StageExit::Failed(error.to_string())
}

/// Helper thread turning a quit event into a shutdown request
struct EventWatcher {
    handle: JoinHandle<()>,
}

impl EventWatcher {
    fn spawn(
        mut events: Box<dyn EventSource>,
        shutdown: ShutdownCoordinator,
        poll: Duration,
    ) -> Result<Self, PipelineError> {
        let handle = thread::Builder::new()
            .name("relay-events".to_string())
            .spawn(move || {
                while shutdown.is_running() {
                    match events.wait_event(poll) {
                        Some(UiEvent::Quit) => {
                            tracing::info!("Quit event received");
                            shutdown.request(ShutdownReason::QuitEvent);
                            break;
                        }
                        Some(UiEvent::Other(event)) => {
                            tracing::debug!("Ignoring UI event: {}", event);
                        }
                        None => {}
                    }
                }
            })
            .map_err(|e| PipelineError::ThreadSpawn(e.to_string()))?;

        Ok(Self { handle })
    }

    fn join(self) {
        if self.handle.join().is_err() {
            tracing::warn!("Event watcher thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use std::sync::{Arc, Mutex};

    impl UnitSize for u32 {
        fn unit_size(&self) -> usize {
            4
        }
    }

    /// Passes units through, failing on one value; flush yields a marker
    struct Passthrough {
        fail_on: Option<u32>,
    }

    impl Decoder for Passthrough {
        type Unit = u32;
        type Frame = u32;

        fn decode(&mut self, unit: u32) -> Result<Vec<u32>, CodecError> {
            if Some(unit) == self.fail_on {
                return Err(CodecError::DecodingFailed("corrupt".into()));
            }
            Ok(vec![unit])
        }

        fn flush(&mut self) -> Result<Vec<u32>, CodecError> {
            Ok(vec![u32::MAX])
        }
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<u32>>>);

    impl Renderer for Collect {
        type Frame = u32;

        fn render(&mut self, frame: u32) {
            self.0.lock().unwrap().push(frame);
        }
    }

    struct Events(Receiver<UiEvent>);

    impl EventSource for Events {
        fn wait_event(&mut self, timeout: Duration) -> Option<UiEvent> {
            self.0.recv_timeout(timeout).ok()
        }
    }

    fn events() -> (Sender<UiEvent>, Events) {
        let (tx, rx) = unbounded();
        (tx, Events(rx))
    }

    #[test]
    fn test_drains_buffered_units_after_shutdown() {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(4, &shutdown).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        shutdown.request_shutdown();

        let rendered = Collect::default();
        let report = ConsumerStage::new(Passthrough { fail_on: None }, rendered.clone())
            .run(&queue)
            .unwrap();

        assert_eq!(report.exit, StageExit::Drained);
        assert_eq!(report.units_received, 2);
        assert_eq!(report.bytes_received, 8);
        assert_eq!(*rendered.0.lock().unwrap(), vec![1, 2, u32::MAX]);
    }

    #[test]
    fn test_decode_error_requests_shutdown() {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(4, &shutdown).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();

        let rendered = Collect::default();
        let report = ConsumerStage::new(Passthrough { fail_on: Some(2) }, rendered.clone())
            .run(&queue)
            .unwrap();

        assert!(matches!(report.exit, StageExit::Failed(_)));
        assert_eq!(shutdown.reason(), Some(ShutdownReason::StageFailed));
        assert_eq!(*rendered.0.lock().unwrap(), vec![1]);
        // Unconsumed unit is left for the pipeline owner
        assert_eq!(queue.drain(), vec![3]);
    }

    #[test]
    fn test_quit_event_unblocks_parked_consumer() {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(2, &shutdown).unwrap();
        let (tx, events) = events();

        let handle = ConsumerStage::new(Passthrough { fail_on: None }, Collect::default())
            .with_events(events)
            .with_event_poll(Duration::from_millis(5))
            .spawn(queue.clone())
            .unwrap();

        while queue.stats().empty_waits == 0 {
            thread::yield_now();
        }
        tx.send(UiEvent::Other("resize".into())).unwrap();
        tx.send(UiEvent::Quit).unwrap();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.exit, StageExit::Drained);
        assert_eq!(report.units_received, 0);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::QuitEvent));
    }

    #[test]
    fn test_watcher_exits_when_someone_else_shuts_down() {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(2, &shutdown).unwrap();
        let (_tx, events) = events();

        let handle = ConsumerStage::new(Passthrough { fail_on: None }, Collect::default())
            .with_events(events)
            .with_event_poll(Duration::from_millis(5))
            .spawn(queue.clone())
            .unwrap();

        queue.push(5).unwrap();
        shutdown.request_shutdown();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.exit, StageExit::Drained);
        assert_eq!(report.units_received, 1);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Requested));
    }
}
