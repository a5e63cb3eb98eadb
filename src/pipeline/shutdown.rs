//! Running flag and shutdown fan-out
//!
//! One [`ShutdownCoordinator`] is created per pipeline run and handed to
//! every queue and stage. Flipping it wakes every thread parked inside a
//! registered queue.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

/// Why the pipeline stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Pipeline owner or another thread asked for it
    Requested,
    /// UI / signal quit event
    QuitEvent,
    /// Capture source ran out of frames
    EndOfStream,
    /// A stage hit a hard error or panicked
    StageFailed,
}

/// Something holding parked threads that must be woken on shutdown.
///
/// Implementations must take the same lock their waiters hold across the
/// flag check and the wait before notifying.
pub trait ShutdownWaker: Send + Sync {
    fn wake_all(&self);
}

struct Inner {
    running: AtomicBool,
    reason: Mutex<Option<ShutdownReason>>,
    wakers: Mutex<Vec<Weak<dyn ShutdownWaker>>>,
}

/// Cloneable handle to the running flag of one pipeline run
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(true),
                reason: Mutex::new(None),
                wakers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Check the running flag
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Request shutdown on behalf of the pipeline owner.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn request_shutdown(&self) -> bool {
        self.request(ShutdownReason::Requested)
    }

    /// Request shutdown with an explicit reason.
    ///
    /// The first reason wins; later calls are no-ops returning `false`.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        {
            let mut slot = self.inner.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            self.inner.running.store(false, Ordering::Release);
        }

        tracing::info!("Shutdown requested ({:?})", reason);

        // Upgrade outside the registry lock so a waker never runs under it
        let wakers: Vec<Arc<dyn ShutdownWaker>> = {
            let mut registry = self.inner.wakers.lock();
            registry.retain(|w| w.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        for waker in wakers {
            waker.wake_all();
        }

        true
    }

    /// First recorded shutdown reason, if any
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.reason.lock()
    }

    /// Register a waker to be notified when shutdown is requested
    pub fn register(&self, waker: Weak<dyn ShutdownWaker>) {
        let mut registry = self.inner.wakers.lock();
        registry.retain(|w| w.strong_count() > 0);
        registry.push(waker);
    }

    /// Guard that requests shutdown if the owning thread unwinds
    pub(crate) fn panic_guard(&self) -> PanicGuard {
        PanicGuard {
            shutdown: self.clone(),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("running", &self.is_running())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Keeps a panicking stage from leaving its partner parked forever
pub(crate) struct PanicGuard {
    shutdown: ShutdownCoordinator,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!("Stage thread panicked, shutting pipeline down");
            self.shutdown.request(ShutdownReason::StageFailed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingWaker(AtomicUsize);

    impl ShutdownWaker for CountingWaker {
        fn wake_all(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_request_is_idempotent() {
        let shutdown = ShutdownCoordinator::new();
        assert!(shutdown.is_running());
        assert_eq!(shutdown.reason(), None);

        assert!(shutdown.request(ShutdownReason::QuitEvent));
        assert!(!shutdown.request_shutdown());
        assert!(!shutdown.request(ShutdownReason::StageFailed));

        assert!(!shutdown.is_running());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::QuitEvent));
    }

    #[test]
    fn test_wakers_fire_once() {
        let shutdown = ShutdownCoordinator::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let weak: Weak<dyn ShutdownWaker> = Arc::downgrade(&waker) as Weak<dyn ShutdownWaker>;
        shutdown.register(weak);

        shutdown.request_shutdown();
        shutdown.request_shutdown();

        assert_eq!(waker.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_wakers_are_skipped() {
        let shutdown = ShutdownCoordinator::new();
        {
            let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));
            shutdown.register(Arc::downgrade(&waker) as Weak<dyn ShutdownWaker>);
        }
        assert!(shutdown.request_shutdown());
    }

    #[test]
    fn test_register_prunes_dead_wakers() {
        let shutdown = ShutdownCoordinator::new();
        for _ in 0..100 {
            let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));
            shutdown.register(Arc::downgrade(&waker) as Weak<dyn ShutdownWaker>);
        }
        let live = Arc::new(CountingWaker(AtomicUsize::new(0)));
        shutdown.register(Arc::downgrade(&live) as Weak<dyn ShutdownWaker>);

        assert_eq!(shutdown.inner.wakers.lock().len(), 1);
        shutdown.request_shutdown();
        assert_eq!(live.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_guard_requests_shutdown() {
        let shutdown = ShutdownCoordinator::new();
        let guard_source = shutdown.clone();

        let result = thread::spawn(move || {
            let _guard = guard_source.panic_guard();
            panic!("stage blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::StageFailed));
    }

    #[test]
    fn test_panic_guard_is_silent_on_normal_exit() {
        let shutdown = ShutdownCoordinator::new();
        {
            let _guard = shutdown.panic_guard();
        }
        assert!(shutdown.is_running());
    }
}
