//! Task runner capabilities
//!
//! A task runner is the handle callers post work through. Three flavors exist,
//! each a stronger promise than the previous one:
//!
//! - [`TaskRunner`]: tasks may run in any order, possibly concurrently.
//! - [`SequencedTaskRunner`]: tasks run one at a time in posting order.
//! - [`SingleThreadTaskRunner`]: sequenced, and always on the same thread.

use crate::location::Location;
use crate::task::OnceClosure;
use std::time::Duration;

/// Posts tasks for asynchronous execution
pub trait TaskRunner: Send + Sync {
    /// Post `task` to run after `delay`.
    ///
    /// Returns `false` if the task will never run because the dispatcher no
    /// longer accepts work. The closure is dropped in that case.
    fn post_delayed_task(&self, from_here: Location, task: OnceClosure, delay: Duration) -> bool;

    /// Whether the calling thread is currently running a task posted through
    /// this runner's sequence (or, for single-thread runners, is the bound
    /// thread)
    fn runs_tasks_in_current_sequence(&self) -> bool;

    /// Post `task` to run as soon as possible
    fn post_task(&self, from_here: Location, task: OnceClosure) -> bool {
        self.post_delayed_task(from_here, task, Duration::ZERO)
    }
}

/// A runner whose tasks never overlap and run in posting order
pub trait SequencedTaskRunner: TaskRunner {}

/// A sequenced runner whose tasks all run on one thread
pub trait SingleThreadTaskRunner: SequencedTaskRunner {
    /// Whether the calling thread is the runner's thread
    fn belongs_to_current_thread(&self) -> bool {
        self.runs_tasks_in_current_sequence()
    }
}

/// Convenience methods taking closures directly
pub trait TaskRunnerExt: TaskRunner {
    /// Post a closure
    fn post<F>(&self, from_here: Location, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_task(from_here, Box::new(f))
    }

    /// Post a closure to run after `delay`
    fn post_delayed<F>(&self, from_here: Location, f: F, delay: Duration) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed_task(from_here, Box::new(f), delay)
    }
}

impl<R: TaskRunner + ?Sized> TaskRunnerExt for R {}
