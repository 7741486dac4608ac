//! Shutdown bookkeeping
//!
//! Decides, per task, whether it may be posted and whether it may run given
//! the shutdown phase and the task's [`TaskShutdownBehavior`]. Shutdown waits
//! for every accepted `BlockShutdown` task and every `SkipOnShutdown` task
//! that had already started.

use crate::task::{TaskShutdownBehavior, TaskTraits};
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct TrackerState {
    shutdown_started: bool,
    shutdown_completed: bool,

    /// Tasks shutdown must wait for: accepted `BlockShutdown` tasks not yet
    /// run, plus `SkipOnShutdown` tasks currently running
    blocking_pending: usize,

    /// Tasks queued in a ready sequence and not yet run or discarded
    incomplete: usize,
}

/// Tracks tasks through shutdown
pub struct TaskTracker {
    state: Mutex<TrackerState>,
    cond: Condvar,
}

impl TaskTracker {
    /// Create a tracker in the running phase
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            cond: Condvar::new(),
        }
    }

    /// Called before a task is accepted. Returns `false` if the post must be
    /// rejected.
    pub fn will_post_task(&self, traits: &TaskTraits) -> bool {
        let mut state = self.state.lock();
        if state.shutdown_completed {
            return false;
        }

        match traits.shutdown_behavior() {
            TaskShutdownBehavior::BlockShutdown => {
                state.blocking_pending += 1;
                true
            }
            _ => !state.shutdown_started,
        }
    }

    /// Called when an accepted task enters a ready sequence
    pub fn will_queue_task(&self) {
        self.state.lock().incomplete += 1;
    }

    /// Called right before a queued task would run. Returns `false` if the
    /// task must be discarded instead; [`did_discard_task`] is then due.
    ///
    /// [`did_discard_task`]: TaskTracker::did_discard_task
    pub fn before_run_task(&self, traits: &TaskTraits) -> bool {
        let mut state = self.state.lock();
        match traits.shutdown_behavior() {
            TaskShutdownBehavior::BlockShutdown => true,
            TaskShutdownBehavior::SkipOnShutdown => {
                if state.shutdown_started {
                    false
                } else {
                    state.blocking_pending += 1;
                    true
                }
            }
            TaskShutdownBehavior::ContinueOnShutdown => !state.shutdown_started,
        }
    }

    /// Called after a task allowed by [`before_run_task`] ran
    ///
    /// [`before_run_task`]: TaskTracker::before_run_task
    pub fn after_run_task(&self, traits: &TaskTraits) {
        let mut state = self.state.lock();
        match traits.shutdown_behavior() {
            TaskShutdownBehavior::BlockShutdown | TaskShutdownBehavior::SkipOnShutdown => {
                state.blocking_pending -= 1;
            }
            TaskShutdownBehavior::ContinueOnShutdown => {}
        }
        state.incomplete -= 1;
        self.cond.notify_all();
    }

    /// Called when a queued task is dropped without running
    pub fn did_discard_task(&self, traits: &TaskTraits) {
        let mut state = self.state.lock();
        if traits.shutdown_behavior() == TaskShutdownBehavior::BlockShutdown {
            state.blocking_pending -= 1;
        }
        state.incomplete -= 1;
        self.cond.notify_all();
    }

    /// Called when an accepted task is dropped before reaching a sequence,
    /// e.g. a delayed task that never became due
    pub fn did_abandon_task(&self, traits: &TaskTraits) {
        if traits.shutdown_behavior() == TaskShutdownBehavior::BlockShutdown {
            let mut state = self.state.lock();
            state.blocking_pending -= 1;
            self.cond.notify_all();
        }
    }

    /// Stop accepting non-blocking tasks
    pub fn start_shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shutdown_started {
            state.shutdown_started = true;
            tracing::debug!(pending = state.blocking_pending, "Shutdown started");
        }
        self.cond.notify_all();
    }

    /// Block until every task shutdown waits for has run
    pub fn wait_for_shutdown_drain(&self) {
        let mut state = self.state.lock();
        while state.blocking_pending > 0 {
            self.cond.wait(&mut state);
        }
    }

    /// Reject every post from now on
    pub fn complete_shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown_completed = true;
        tracing::debug!("Shutdown complete");
        self.cond.notify_all();
    }

    /// Whether shutdown has started
    pub fn is_shutdown_started(&self) -> bool {
        self.state.lock().shutdown_started
    }

    /// Whether shutdown has completed
    pub fn is_shutdown_completed(&self) -> bool {
        self.state.lock().shutdown_completed
    }

    /// Block until every queued task has run or been discarded. Delayed
    /// tasks that are not due yet are not waited for.
    pub fn flush_for_testing(&self) {
        let mut state = self.state.lock();
        while state.incomplete > 0 {
            self.cond.wait(&mut state);
        }
    }

    /// Number of queued tasks not yet run or discarded
    pub fn incomplete_count(&self) -> usize {
        self.state.lock().incomplete
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn traits(behavior: TaskShutdownBehavior) -> TaskTraits {
        TaskTraits::from(behavior)
    }

    #[test]
    fn test_posts_accepted_before_shutdown() {
        let tracker = TaskTracker::new();
        assert!(tracker.will_post_task(&traits(TaskShutdownBehavior::SkipOnShutdown)));
        assert!(tracker.will_post_task(&traits(TaskShutdownBehavior::ContinueOnShutdown)));
        assert!(tracker.will_post_task(&traits(TaskShutdownBehavior::BlockShutdown)));
    }

    #[test]
    fn test_only_block_shutdown_accepted_during_shutdown() {
        let tracker = TaskTracker::new();
        tracker.start_shutdown();
        assert!(!tracker.will_post_task(&traits(TaskShutdownBehavior::SkipOnShutdown)));
        assert!(!tracker.will_post_task(&traits(TaskShutdownBehavior::ContinueOnShutdown)));
        assert!(tracker.will_post_task(&traits(TaskShutdownBehavior::BlockShutdown)));
    }

    #[test]
    fn test_nothing_accepted_after_shutdown_completes() {
        let tracker = TaskTracker::new();
        tracker.start_shutdown();
        tracker.wait_for_shutdown_drain();
        tracker.complete_shutdown();
        assert!(!tracker.will_post_task(&traits(TaskShutdownBehavior::BlockShutdown)));
        assert!(tracker.is_shutdown_completed());
    }

    #[test]
    fn test_skip_on_shutdown_not_run_after_start() {
        let tracker = TaskTracker::new();
        let skip = traits(TaskShutdownBehavior::SkipOnShutdown);
        assert!(tracker.will_post_task(&skip));
        tracker.will_queue_task();

        tracker.start_shutdown();
        assert!(!tracker.before_run_task(&skip));
        tracker.did_discard_task(&skip);
        assert_eq!(tracker.incomplete_count(), 0);
    }

    #[test]
    fn test_continue_on_shutdown_not_run_after_start() {
        let tracker = TaskTracker::new();
        let cont = traits(TaskShutdownBehavior::ContinueOnShutdown);
        tracker.start_shutdown();
        assert!(!tracker.before_run_task(&cont));
    }

    #[test]
    fn test_drain_waits_for_block_shutdown() {
        let tracker = Arc::new(TaskTracker::new());
        let block = traits(TaskShutdownBehavior::BlockShutdown);
        assert!(tracker.will_post_task(&block));
        tracker.will_queue_task();
        tracker.start_shutdown();

        let t = tracker.clone();
        let runner = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            assert!(t.before_run_task(&block));
            t.after_run_task(&block);
        });

        tracker.wait_for_shutdown_drain();
        assert_eq!(tracker.incomplete_count(), 0);
        runner.join().unwrap();
    }

    #[test]
    fn test_drain_waits_for_running_skip_on_shutdown() {
        let tracker = Arc::new(TaskTracker::new());
        let skip = traits(TaskShutdownBehavior::SkipOnShutdown);
        assert!(tracker.will_post_task(&skip));
        tracker.will_queue_task();
        assert!(tracker.before_run_task(&skip));

        tracker.start_shutdown();
        let t = tracker.clone();
        let runner = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            t.after_run_task(&skip);
        });

        tracker.wait_for_shutdown_drain();
        assert_eq!(tracker.incomplete_count(), 0);
        runner.join().unwrap();
    }

    #[test]
    fn test_abandoned_block_shutdown_releases_drain() {
        let tracker = TaskTracker::new();
        let block = traits(TaskShutdownBehavior::BlockShutdown);
        assert!(tracker.will_post_task(&block));
        tracker.did_abandon_task(&block);
        tracker.start_shutdown();
        tracker.wait_for_shutdown_drain();
    }
}
