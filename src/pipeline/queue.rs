//! Bounded blocking FIFO for encoded units
//!
//! A fixed ring of ownership slots guarded by one mutex, with one condvar
//! per wait direction. Pushers park while the ring is full, poppers park
//! while it is empty, and both re-check the running flag under the lock
//! before parking so a shutdown wake-up can never be missed.
//!
//! Shutdown policy is drain: once the flag drops, pushes are refused but
//! pops keep handing out buffered units until the ring is empty.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::shutdown::{ShutdownCoordinator, ShutdownWaker};

/// Queue lifecycle as observed from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Running,
    ShuttingDown,
    Drained,
}

/// Counters kept under the queue lock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    /// Pushes refused because shutdown was requested
    pub rejected: u64,
    /// Pushes that had to park on a full queue
    pub full_waits: u64,
    /// Pops that had to park on an empty queue
    pub empty_waits: u64,
    pub high_water: usize,
}

/// Blocking push refused by shutdown; the caller gets the unit back
pub struct PushError<T>(pub T);

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is shutting down")
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Non-blocking push failure; the caller gets the unit back
pub enum TryPushError<T> {
    Full(T),
    ShutDown(T),
}

impl<T> TryPushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(unit) | TryPushError::ShutDown(unit) => unit,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TryPushError::Full(_))
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("Full(..)"),
            TryPushError::ShutDown(_) => f.write_str("ShutDown(..)"),
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("queue is full"),
            TryPushError::ShutDown(_) => f.write_str("queue is shutting down"),
        }
    }
}

impl<T> std::error::Error for TryPushError<T> {}

/// Ring of ownership slots. Only `[head, head + count)` holds `Some`.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    count: usize,
    stats: QueueStats,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            tail: 0,
            count: 0,
            stats: QueueStats::default(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn push_back(&mut self, unit: T) {
        debug_assert!(!self.is_full());
        debug_assert!(self.slots[self.tail].is_none());

        self.slots[self.tail] = Some(unit);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;

        self.stats.pushed += 1;
        self.stats.high_water = self.stats.high_water.max(self.count);
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }

        let unit = self.slots[self.head].take();
        debug_assert!(unit.is_some());

        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        self.stats.popped += 1;
        unit
    }
}

struct Shared<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T: Send> ShutdownWaker for Shared<T> {
    fn wake_all(&self) {
        // Holding the lock orders this notify after any in-flight flag check
        let _ring = self.ring.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Fixed-capacity FIFO shared between the producer and consumer stages.
///
/// Cloning yields another handle to the same queue.
pub struct BoundedUnitQueue<T> {
    shared: Arc<Shared<T>>,
    shutdown: ShutdownCoordinator,
}

impl<T: Send + 'static> BoundedUnitQueue<T> {
    /// Create a queue bound to `shutdown`'s running flag
    pub fn new(capacity: usize, shutdown: &ShutdownCoordinator) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidCapacity);
        }

        let shared = Arc::new(Shared {
            ring: Mutex::new(Ring::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        });

        let waker: Arc<dyn ShutdownWaker> = shared.clone();
        shutdown.register(Arc::downgrade(&waker));

        Ok(Self {
            shared,
            shutdown: shutdown.clone(),
        })
    }
}

impl<T> BoundedUnitQueue<T> {
    /// Enqueue a unit, parking while the queue is full.
    ///
    /// Fails once shutdown has been requested, including while parked; the
    /// unit is handed back inside the error.
    pub fn push(&self, unit: T) -> Result<(), PushError<T>> {
        let mut ring = self.shared.ring.lock();
        let mut parked = false;

        loop {
            if !self.shutdown.is_running() {
                ring.stats.rejected += 1;
                return Err(PushError(unit));
            }
            if !ring.is_full() {
                break;
            }
            if !parked {
                ring.stats.full_waits += 1;
                parked = true;
            }
            self.shared.not_full.wait(&mut ring);
        }

        ring.push_back(unit);
        drop(ring);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest unit, parking while the queue is empty.
    ///
    /// Returns `None` only when shutdown has been requested and nothing is
    /// left to drain. Every later call returns `None` as well.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.shared.ring.lock();
        let mut parked = false;

        loop {
            if let Some(unit) = ring.pop_front() {
                drop(ring);
                self.shared.not_full.notify_one();
                return Some(unit);
            }
            if !self.shutdown.is_running() {
                return None;
            }
            if !parked {
                ring.stats.empty_waits += 1;
                parked = true;
            }
            self.shared.not_empty.wait(&mut ring);
        }
    }

    /// Enqueue without blocking
    pub fn try_push(&self, unit: T) -> Result<(), TryPushError<T>> {
        let mut ring = self.shared.ring.lock();

        if !self.shutdown.is_running() {
            ring.stats.rejected += 1;
            return Err(TryPushError::ShutDown(unit));
        }
        if ring.is_full() {
            return Err(TryPushError::Full(unit));
        }

        ring.push_back(unit);
        drop(ring);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue without blocking
    pub fn try_pop(&self) -> Option<T> {
        let unit = self.shared.ring.lock().pop_front();
        if unit.is_some() {
            self.shared.not_full.notify_one();
        }
        unit
    }

    /// Remove every buffered unit in FIFO order.
    ///
    /// Used by the pipeline owner after both stages have joined.
    pub fn drain(&self) -> Vec<T> {
        let mut ring = self.shared.ring.lock();
        let mut units = Vec::with_capacity(ring.count);
        while let Some(unit) = ring.pop_front() {
            units.push(unit);
        }
        drop(ring);
        self.shared.not_full.notify_all();
        units
    }

    pub fn state(&self) -> QueueState {
        let ring = self.shared.ring.lock();
        if self.shutdown.is_running() {
            QueueState::Running
        } else if ring.count > 0 {
            QueueState::ShuttingDown
        } else {
            QueueState::Drained
        }
    }

    pub fn len(&self) -> usize {
        self.shared.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.shared.ring.lock().is_full()
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.lock().capacity()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.ring.lock().stats.clone()
    }

    /// Shutdown handle this queue observes
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }
}

impl<T> Clone for BoundedUnitQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T> fmt::Debug for BoundedUnitQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.shared.ring.lock();
        f.debug_struct("BoundedUnitQueue")
            .field("count", &ring.count)
            .field("capacity", &ring.capacity())
            .field("running", &self.shutdown.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue(capacity: usize) -> (ShutdownCoordinator, BoundedUnitQueue<u32>) {
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(capacity, &shutdown).unwrap();
        (shutdown, queue)
    }

    /// Counts how many times it has been dropped
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let shutdown = ShutdownCoordinator::new();
        let result = BoundedUnitQueue::<u32>::new(0, &shutdown);
        assert!(matches!(result, Err(PipelineError::InvalidCapacity)));
    }

    #[test]
    fn test_fifo_with_wraparound() {
        let (_shutdown, queue) = queue(3);

        for round in 0..5u32 {
            queue.push(round * 10).unwrap();
            queue.push(round * 10 + 1).unwrap();
            assert_eq!(queue.pop(), Some(round * 10));
            assert_eq!(queue.pop(), Some(round * 10 + 1));
        }

        assert!(queue.is_empty());
        assert_eq!(queue.stats().pushed, 10);
        assert_eq!(queue.stats().popped, 10);
    }

    #[test]
    fn test_try_push_reports_full() {
        let (_shutdown, queue) = queue(2);

        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert!(queue.is_full());

        let err = queue.try_push(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_after_shutdown_returns_unit() {
        let (shutdown, queue) = queue(4);
        shutdown.request_shutdown();

        let err = queue.push(7).unwrap_err();
        assert_eq!(err.into_inner(), 7);

        let err = queue.try_push(8).unwrap_err();
        assert!(!err.is_full());
        assert_eq!(queue.stats().rejected, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_state_machine_drains_then_sticks() {
        let (shutdown, queue) = queue(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.state(), QueueState::Running);

        shutdown.request_shutdown();
        assert_eq!(queue.state(), QueueState::ShuttingDown);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.state(), QueueState::Drained);

        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
        assert!(queue.push(3).is_err());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_high_water_mark() {
        let (_shutdown, queue) = queue(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        queue.pop();
        queue.pop();
        queue.push(9).unwrap();

        assert_eq!(queue.stats().high_water, 5);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_drain_returns_fifo_order() {
        let (shutdown, queue) = queue(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();
        shutdown.request_shutdown();

        assert_eq!(queue.drain(), vec![1, 2, 3]);
        assert!(queue.drain().is_empty());
        assert_eq!(queue.state(), QueueState::Drained);
    }

    #[test]
    fn test_units_released_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownCoordinator::new();
        let queue = BoundedUnitQueue::new(4, &shutdown).unwrap();

        for _ in 0..3 {
            queue.push(Tracked(drops.clone())).unwrap();
        }

        // Popped unit is released by its new owner
        drop(queue.pop());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        // Refused unit comes back to the caller and is released there
        shutdown.request_shutdown();
        let refused = queue.push(Tracked(drops.clone())).unwrap_err();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(refused);
        assert_eq!(drops.load(Ordering::SeqCst), 2);

        // Still-buffered units go with the last handle
        let other = queue.clone();
        drop(queue);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        drop(other);
        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_capacity_and_clone_share_state() {
        let (_shutdown, queue) = queue(5);
        let handle = queue.clone();

        handle.push(42).unwrap();
        assert_eq!(queue.capacity(), 5);
        assert_eq!(queue.try_pop(), Some(42));
        assert!(handle.is_empty());
    }
}
