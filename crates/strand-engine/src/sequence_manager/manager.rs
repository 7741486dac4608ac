//! Single-thread loop driver
//!
//! A [`SequenceManager`] binds to the thread that creates it. Tasks posted
//! through its [`LoopTaskRunner`] from any thread land in one default
//! sequence (or, if delayed, in a delayed queue) and run on the bound thread
//! whenever a [`RunLoop`] is running there.
//!
//! ## Nesting
//!
//! A task may start a nested `RunLoop`. The nested level only runs tasks if
//! it was created with [`RunKind::NestableTasksAllowed`] or the task enabled
//! [`LoopDriver::set_nestable_tasks_allowed`]. Otherwise tasks posted
//! meanwhile wait until the outer task returns.
//!
//! [`LoopTaskRunner`]: crate::sequence_manager::LoopTaskRunner
//! [`RunLoop`]: crate::sequence_manager::RunLoop
//! [`RunKind::NestableTasksAllowed`]: crate::sequence_manager::RunKind::NestableTasksAllowed

use crate::delayed_queue::DelayedTaskQueue;
use crate::location::Location;
use crate::sequence::{ScopedSequenceContext, Sequence};
use crate::sequence_manager::observer::{ObserverList, TaskObserver};
use crate::sequence_manager::pump::{DefaultPump, MessagePump};
use crate::sequence_manager::run_loop::{QuitFlags, RunKind};
use crate::sequence_manager::runner::LoopTaskRunner;
use crate::task::{OnceClosure, Task, TaskTraits};
use crate::thread_pool::TaskTracker;
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// What the loop thread is doing
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// No task is running
    Idle,
    /// One task is running
    RunningTask,
    /// A task is running inside another task's nested run level
    NestedRunningTask,
}

struct IncomingQueue {
    /// Delayed tasks not yet due
    delayed: DelayedTaskQueue<Task>,
    /// Cleared when the manager is destroyed
    accepting: bool,
}

/// State shared between the loop thread and the posting threads
pub(crate) struct LoopShared {
    sequence: Arc<Sequence>,
    incoming: Mutex<IncomingQueue>,
    pump: Arc<dyn MessagePump>,
    tracker: Option<Arc<TaskTracker>>,
    thread_id: ThreadId,
    traits: TaskTraits,
}

impl LoopShared {
    pub(crate) fn post_task(&self, from_here: Location, closure: OnceClosure, delay: Duration) -> bool {
        let task = Task::new(from_here, self.traits, closure, delay);

        let mut incoming = self.incoming.lock();
        if !incoming.accepting {
            return false;
        }
        if let Some(tracker) = &self.tracker {
            if !tracker.will_post_task(task.traits()) {
                return false;
            }
        }

        match task.delayed_run_time() {
            None => {
                if let Some(tracker) = &self.tracker {
                    tracker.will_queue_task();
                }
                self.sequence.push_task(task);
                drop(incoming);
                self.pump.schedule_work();
            }
            Some(due) => {
                let earliest = incoming.delayed.next_wake_time().map_or(true, |next| due < next);
                incoming.delayed.push(due, task);
                drop(incoming);
                if earliest {
                    self.pump.schedule_delayed_work(due);
                }
            }
        }
        true
    }

    /// Move every due delayed task into the default sequence
    fn enqueue_due_delayed_tasks(&self, now: Instant) {
        let mut incoming = self.incoming.lock();
        for task in incoming.delayed.take_ready(now) {
            if let Some(tracker) = &self.tracker {
                tracker.will_queue_task();
            }
            self.sequence.push_task(task);
        }
    }

    fn next_delayed_run_time(&self) -> Option<Instant> {
        self.incoming.lock().delayed.next_wake_time()
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.incoming.lock().accepting
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub(crate) fn pump(&self) -> &Arc<dyn MessagePump> {
        &self.pump
    }

    /// Stop accepting tasks and drop every pending one
    fn shutdown(&self) {
        let (delayed, queued) = {
            let mut incoming = self.incoming.lock();
            incoming.accepting = false;
            (incoming.delayed.drain(), self.sequence.discard_all())
        };

        if let Some(tracker) = &self.tracker {
            for task in &delayed {
                tracker.did_abandon_task(task.traits());
            }
            for task in &queued {
                tracker.did_discard_task(task.traits());
            }
        }
        if !delayed.is_empty() || !queued.is_empty() {
            tracing::debug!(
                delayed = delayed.len(),
                queued = queued.len(),
                "Discarding tasks of destroyed loop"
            );
        }
    }
}

thread_local! {
    static CURRENT_DRIVER: RefCell<Weak<LoopDriver>> = const { RefCell::new(Weak::new()) };
}

/// Loop state owned by the bound thread
///
/// Reached through a [`SequenceManager`] (which derefs to it) or through
/// [`SequenceManager::current`].
pub struct LoopDriver {
    shared: Arc<LoopShared>,
    runner: Arc<LoopTaskRunner>,
    observers: RefCell<ObserverList>,
    nestable_tasks_allowed: Cell<bool>,
    /// Tasks on the call stack
    tasks_in_flight: Cell<usize>,
    /// Active run levels
    run_depth: Cell<usize>,
}

impl LoopDriver {
    /// Runner posting to this loop
    pub fn task_runner(&self) -> Arc<LoopTaskRunner> {
        self.runner.clone()
    }

    /// The default sequence all tasks of this loop run in
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.shared.sequence
    }

    /// Register an observer, notified around every task
    pub fn add_task_observer(&self, observer: Rc<dyn TaskObserver>) {
        self.check_bound_thread("add_task_observer");
        self.observers.borrow_mut().add(observer);
    }

    /// Unregister an observer. Returns `false` if it was not registered.
    pub fn remove_task_observer(&self, observer: &Rc<dyn TaskObserver>) -> bool {
        self.check_bound_thread("remove_task_observer");
        self.observers.borrow_mut().remove(observer)
    }

    /// Allow or forbid nested run levels to run tasks. Returns the previous
    /// value. Reset to `false` around every task.
    pub fn set_nestable_tasks_allowed(&self, allowed: bool) -> bool {
        self.nestable_tasks_allowed.replace(allowed)
    }

    /// Whether nested run levels may run tasks
    pub fn nestable_tasks_allowed(&self) -> bool {
        self.nestable_tasks_allowed.get()
    }

    /// What the loop is doing right now
    pub fn state(&self) -> LoopState {
        match self.tasks_in_flight.get() {
            0 => LoopState::Idle,
            1 => LoopState::RunningTask,
            _ => LoopState::NestedRunningTask,
        }
    }

    /// Number of active run levels
    pub fn nesting_depth(&self) -> usize {
        self.run_depth.get()
    }

    /// Whether no task is ready to run now. Delayed tasks that are not due
    /// yet do not count.
    pub fn is_idle_for_testing(&self) -> bool {
        if !self.shared.sequence.is_empty() {
            return false;
        }
        self.shared
            .next_delayed_run_time()
            .map_or(true, |due| due > Instant::now())
    }

    pub(crate) fn shared_pump(&self) -> Arc<dyn MessagePump> {
        self.shared.pump().clone()
    }

    fn check_bound_thread(&self, operation: &str) {
        if thread::current().id() != self.shared.thread_id {
            crate::contract_violation!(operation, "Loop used off its bound thread");
        }
    }

    /// Run tasks until `flags` ask to quit
    pub(crate) fn run_level(&self, kind: RunKind, flags: &QuitFlags, until_idle: bool) {
        self.run_depth.set(self.run_depth.get() + 1);
        tracing::trace!(depth = self.run_depth.get(), ?kind, "Entering run level");

        loop {
            if flags.should_quit() {
                break;
            }
            let nested_allowed =
                kind == RunKind::NestableTasksAllowed || self.nestable_tasks_allowed.get();
            if self.run_one_task(nested_allowed) {
                continue;
            }
            if until_idle || flags.should_quit_when_idle() {
                break;
            }
            self.shared.pump.wait_until(self.shared.next_delayed_run_time());
        }

        tracing::trace!(depth = self.run_depth.get(), "Leaving run level");
        self.run_depth.set(self.run_depth.get() - 1);
    }

    /// Run at most one ready task. Returns `false` if none could run.
    fn run_one_task(&self, nested_allowed: bool) -> bool {
        self.shared.enqueue_due_delayed_tasks(Instant::now());

        let outermost = self.tasks_in_flight.get() == 0;
        if !outermost && !nested_allowed {
            return false;
        }

        let sequence = &self.shared.sequence;
        if outermost {
            if sequence.is_empty() {
                return false;
            }
            if !sequence.try_claim() {
                crate::contract_violation!(
                    sequence = sequence.id().as_u64(),
                    "Loop sequence claimed by another dispatcher"
                );
            }
        }

        // Nested levels run under the claim held by the outermost one
        let ran = match sequence.take_task() {
            Some(task) => {
                self.run_task(task);
                true
            }
            None => false,
        };

        if outermost {
            sequence.did_run_task();
        }
        ran
    }

    fn run_task(&self, task: Task) {
        let traits = *task.traits();
        if let Some(tracker) = &self.shared.tracker {
            if !tracker.before_run_task(&traits) {
                drop(task);
                tracker.did_discard_task(&traits);
                return;
            }
        }

        let metadata = task.metadata().clone();
        let observers = self.observers.borrow().snapshot();
        for observer in &observers {
            observer.on_task_started(&metadata);
        }

        self.tasks_in_flight.set(self.tasks_in_flight.get() + 1);
        let previous_nestable = self.nestable_tasks_allowed.replace(false);
        {
            let _sequence = ScopedSequenceContext::enter(self.shared.sequence.id());
            task.run();
        }
        self.nestable_tasks_allowed.set(previous_nestable);
        self.tasks_in_flight.set(self.tasks_in_flight.get() - 1);

        for observer in &observers {
            observer.on_task_completed(&metadata);
        }
        if let Some(tracker) = &self.shared.tracker {
            tracker.after_run_task(&traits);
        }
    }
}

/// Owner of a loop bound to the current thread
///
/// Not `Send`: the loop can only be driven from the thread that created it.
/// Dropping the manager unbinds it and discards every pending task; posts
/// made afterwards return `false`.
pub struct SequenceManager {
    driver: Rc<LoopDriver>,
}

impl SequenceManager {
    /// Bind a manager with a [`DefaultPump`] to the current thread
    pub fn new() -> Self {
        Self::with_pump(Arc::new(DefaultPump::new()))
    }

    /// Bind a manager driven by `pump` to the current thread
    pub fn with_pump(pump: Arc<dyn MessagePump>) -> Self {
        Self::build(pump, None, TaskTraits::new())
    }

    /// Manager whose tasks go through a pool's shutdown tracker
    pub(crate) fn with_tracker(
        pump: Arc<dyn MessagePump>,
        tracker: Arc<TaskTracker>,
        traits: TaskTraits,
    ) -> Self {
        Self::build(pump, Some(tracker), traits)
    }

    fn build(pump: Arc<dyn MessagePump>, tracker: Option<Arc<TaskTracker>>, traits: TaskTraits) -> Self {
        if CURRENT_DRIVER.with(|current| current.borrow().upgrade().is_some()) {
            crate::contract_violation!("A SequenceManager is already bound to this thread");
        }

        let shared = Arc::new(LoopShared {
            sequence: Sequence::new(traits),
            incoming: Mutex::new(IncomingQueue {
                delayed: DelayedTaskQueue::new(),
                accepting: true,
            }),
            pump,
            tracker,
            thread_id: thread::current().id(),
            traits,
        });
        let driver = Rc::new(LoopDriver {
            runner: Arc::new(LoopTaskRunner::new(shared.clone())),
            shared,
            observers: RefCell::new(ObserverList::default()),
            nestable_tasks_allowed: Cell::new(false),
            tasks_in_flight: Cell::new(0),
            run_depth: Cell::new(0),
        });

        CURRENT_DRIVER.with(|current| *current.borrow_mut() = Rc::downgrade(&driver));
        Self { driver }
    }

    /// The loop bound to the current thread, if any
    pub fn current() -> Option<Rc<LoopDriver>> {
        CURRENT_DRIVER.with(|current| current.borrow().upgrade())
    }
}

impl Default for SequenceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SequenceManager {
    type Target = LoopDriver;

    fn deref(&self) -> &LoopDriver {
        &self.driver
    }
}

impl Drop for SequenceManager {
    fn drop(&mut self) {
        CURRENT_DRIVER.with(|current| *current.borrow_mut() = Weak::new());
        self.driver.shared.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TaskRunnerExt;
    use crate::sequence_manager::RunLoop;

    #[test]
    fn test_current_is_bound() {
        assert!(SequenceManager::current().is_none());
        let manager = SequenceManager::new();
        let current = SequenceManager::current().expect("manager bound");
        assert!(Rc::ptr_eq(&current, &manager.driver));
        drop(current);
        drop(manager);
        assert!(SequenceManager::current().is_none());
    }

    #[test]
    fn test_state_and_depth() {
        let manager = SequenceManager::new();
        assert_eq!(manager.state(), LoopState::Idle);
        assert_eq!(manager.nesting_depth(), 0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        manager.task_runner().post(crate::from_here!(), move || {
            let driver = SequenceManager::current().expect("running on the loop thread");
            s.lock().push((driver.state(), driver.nesting_depth()));
        });
        RunLoop::new().run_until_idle();

        assert_eq!(*seen.lock(), vec![(LoopState::RunningTask, 1)]);
        assert_eq!(manager.state(), LoopState::Idle);
        assert_eq!(manager.nesting_depth(), 0);
    }

    #[test]
    fn test_idle_for_testing() {
        let manager = SequenceManager::new();
        assert!(manager.is_idle_for_testing());

        let runner = manager.task_runner();
        runner.post(crate::from_here!(), || {});
        assert!(!manager.is_idle_for_testing());

        runner.post_delayed(crate::from_here!(), || {}, Duration::from_secs(60));
        RunLoop::new().run_until_idle();
        assert!(manager.is_idle_for_testing());
    }

    #[test]
    fn test_drop_rejects_posts() {
        let manager = SequenceManager::new();
        let runner = manager.task_runner();
        assert!(runner.post(crate::from_here!(), || {}));
        drop(manager);
        assert!(!runner.post(crate::from_here!(), || {}));
    }
}
