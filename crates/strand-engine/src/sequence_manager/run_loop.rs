//! Run levels of a loop

use crate::sequence_manager::manager::{LoopDriver, SequenceManager};
use crate::sequence_manager::pump::MessagePump;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether a nested run level may run tasks
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RunKind {
    /// Nested levels only run tasks if the loop allows nestable tasks
    #[default]
    Default,
    /// This level runs tasks even when nested
    NestableTasksAllowed,
}

#[derive(Debug, Default)]
pub(crate) struct QuitFlags {
    quit: AtomicBool,
    quit_when_idle: AtomicBool,
}

impl QuitFlags {
    pub(crate) fn should_quit(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    pub(crate) fn should_quit_when_idle(&self) -> bool {
        self.quit_when_idle.load(Ordering::Acquire)
    }
}

/// One run level of the loop bound to the current thread
///
/// Not `Send`. Use [`quit_handle`](RunLoop::quit_handle) to stop it from
/// another thread.
pub struct RunLoop {
    driver: Rc<LoopDriver>,
    kind: RunKind,
    flags: Arc<QuitFlags>,
}

impl RunLoop {
    /// Run level of kind [`RunKind::Default`]
    pub fn new() -> Self {
        Self::with_kind(RunKind::Default)
    }

    /// Run level of the given kind. The current thread must have a
    /// [`SequenceManager`].
    pub fn with_kind(kind: RunKind) -> Self {
        let Some(driver) = SequenceManager::current() else {
            crate::contract_violation!("RunLoop created on a thread without a SequenceManager");
        };
        Self {
            driver,
            kind,
            flags: Arc::new(QuitFlags::default()),
        }
    }

    /// Run tasks until [`quit`](RunLoop::quit) is called
    pub fn run(&self) {
        self.driver.run_level(self.kind, &self.flags, false);
    }

    /// Run every ready task, then return
    pub fn run_until_idle(&self) {
        self.driver.run_level(self.kind, &self.flags, true);
    }

    /// Stop this level after the running task
    pub fn quit(&self) {
        self.quit_handle().quit();
    }

    /// Stop this level once no task is ready
    pub fn quit_when_idle(&self) {
        self.quit_when_idle_handle().quit();
    }

    /// Handle that quits this level from any thread
    pub fn quit_handle(&self) -> QuitHandle {
        self.handle(false)
    }

    /// Handle that makes this level quit once idle, from any thread
    pub fn quit_when_idle_handle(&self) -> QuitHandle {
        self.handle(true)
    }

    fn handle(&self, when_idle: bool) -> QuitHandle {
        QuitHandle {
            flags: self.flags.clone(),
            pump: self.driver.shared_pump(),
            when_idle,
        }
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Quits a run level from any thread
#[derive(Clone)]
pub struct QuitHandle {
    flags: Arc<QuitFlags>,
    pump: Arc<dyn MessagePump>,
    when_idle: bool,
}

impl QuitHandle {
    /// Ask the run level to quit and wake the loop
    pub fn quit(&self) {
        let flag = if self.when_idle {
            &self.flags.quit_when_idle
        } else {
            &self.flags.quit
        };
        flag.store(true, Ordering::Release);
        self.pump.schedule_work();
    }
}

/// Lets nested run levels run tasks while it lives
///
/// Created inside a task; restores the previous setting on drop.
pub struct ScopedNestableTaskAllower {
    driver: Rc<LoopDriver>,
    previous: bool,
}

impl ScopedNestableTaskAllower {
    /// Allow nestable tasks on the current thread's loop
    pub fn new() -> Self {
        let Some(driver) = SequenceManager::current() else {
            crate::contract_violation!(
                "ScopedNestableTaskAllower created on a thread without a SequenceManager"
            );
        };
        let previous = driver.set_nestable_tasks_allowed(true);
        Self { driver, previous }
    }
}

impl Default for ScopedNestableTaskAllower {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedNestableTaskAllower {
    fn drop(&mut self) {
        self.driver.set_nestable_tasks_allowed(self.previous);
    }
}
