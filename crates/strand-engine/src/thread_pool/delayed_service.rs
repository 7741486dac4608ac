//! Service thread for delayed work
//!
//! Holds callbacks until their due time, then runs them on its own thread.
//! The pool uses it to post delayed tasks into their sequences and to check
//! may-block thresholds. The thread waits on a condvar until the earliest due
//! time instead of polling.

use crate::delayed_queue::DelayedTaskQueue;
use crate::error::{EngineError, EngineResult};
use crate::task::deadline_after;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback run once its due time is reached
pub(crate) type DelayedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Delayed work service thread
pub struct DelayedTaskService {
    /// Pending callbacks ordered by due time
    queue: Mutex<DelayedTaskQueue<DelayedCallback>>,
    /// Wakes the service thread when an earlier entry is added or on stop
    notify: Condvar,
    /// Shutdown signal
    shutdown: AtomicBool,
    /// Thread handle
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedTaskService {
    /// Create a stopped service
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(DelayedTaskQueue::new()),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    /// Start the service thread
    pub fn start(self: &Arc<Self>, thread_name: String) -> EngineResult<()> {
        let service = Arc::clone(self);

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || service.run_loop())
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to spawn delayed task service");
                EngineError::WorkerSpawn(e)
            })?;

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop the service thread. Pending callbacks are dropped without running.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        {
            let _queue = self.queue.lock();
            self.notify.notify_one();
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        let dropped = std::mem::take(&mut *self.queue.lock());
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "Dropping pending delayed callbacks");
        }
    }

    /// Run `callback` on the service thread once `due` is reached.
    ///
    /// Returns `false` (dropping the callback) if the service is stopped.
    pub(crate) fn schedule(&self, due: Instant, callback: DelayedCallback) -> bool {
        let mut queue = self.queue.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        let wake_earlier = queue.next_wake_time().map_or(true, |next| due < next);
        queue.push(due, callback);
        if wake_earlier {
            self.notify.notify_one();
        }
        true
    }

    /// Run `callback` once `delay` has elapsed
    pub(crate) fn schedule_after(&self, delay: Duration, callback: DelayedCallback) -> bool {
        self.schedule(deadline_after(Instant::now(), delay), callback)
    }

    /// Service thread main loop
    fn run_loop(&self) {
        tracing::trace!("Delayed task service started");
        loop {
            let mut queue = self.queue.lock();

            // Checked under the lock so a stop() between iterations is not missed
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            let ready = queue.take_ready(Instant::now());
            if !ready.is_empty() {
                drop(queue);
                for callback in ready {
                    callback();
                }
                continue;
            }

            match queue.next_wake_time() {
                Some(next) => {
                    let now = Instant::now();
                    if next > now {
                        self.notify.wait_for(&mut queue, next - now);
                    }
                }
                None => self.notify.wait(&mut queue),
            }
        }
        tracing::trace!("Delayed task service shutting down");
    }

    /// Number of callbacks not yet run
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Drop for DelayedTaskService {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_service_creation() {
        let service = DelayedTaskService::new();
        assert_eq!(service.pending_count(), 0);
    }

    #[test]
    fn test_schedule_before_start_is_held() {
        let service = DelayedTaskService::new();
        assert!(service.schedule_after(Duration::from_millis(10), Box::new(|| {})));
        assert_eq!(service.pending_count(), 1);
    }

    #[test]
    fn test_runs_callbacks_in_due_order_not_early() {
        let service = DelayedTaskService::new();
        service.start("test-delayed".to_string()).unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        for (label, delay_ms) in [("b", 40u64), ("a", 20)] {
            let o = order.clone();
            service.schedule(
                start + Duration::from_millis(delay_ms),
                Box::new(move || o.lock().push((label, start.elapsed()))),
            );
        }

        thread::sleep(Duration::from_millis(150));
        let order = order.lock();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].0, "a");
        assert!(order[0].1 >= Duration::from_millis(20));
        assert_eq!(order[1].0, "b");
        assert!(order[1].1 >= Duration::from_millis(40));

        service.stop();
    }

    #[test]
    fn test_stop_drops_pending() {
        let service = DelayedTaskService::new();
        service.start("test-delayed".to_string()).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        service.schedule_after(
            Duration::from_secs(60),
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        service.stop();

        assert_eq!(service.pending_count(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(!service.schedule_after(Duration::ZERO, Box::new(|| {})));
    }

    #[test]
    fn test_schedule_after_huge_delay() {
        let service = DelayedTaskService::new();
        service.start("test-delayed".to_string()).unwrap();

        assert!(service.schedule_after(Duration::MAX, Box::new(|| {})));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(service.pending_count(), 1);

        service.stop();
        assert_eq!(service.pending_count(), 0);
    }
}
