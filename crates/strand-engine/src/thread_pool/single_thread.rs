//! Runners bound to a dedicated pool thread
//!
//! Each runner owns a thread driving its own [`SequenceManager`]. Tasks go
//! through the pool's shutdown tracker like any pool task. When the runner
//! is dropped its thread finishes the ready tasks and exits.

use crate::error::{EngineError, EngineResult};
use crate::location::Location;
use crate::runner::{SequencedTaskRunner, SingleThreadTaskRunner, TaskRunner};
use crate::sequence::SequenceId;
use crate::sequence_manager::{DefaultPump, LoopTaskRunner, QuitHandle, RunLoop, SequenceManager};
use crate::task::{OnceClosure, TaskTraits};
use crate::thread_pool::pool::PoolInner;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runner whose tasks all run, in posting order, on one dedicated thread
pub struct PooledSingleThreadTaskRunner {
    runner: Arc<LoopTaskRunner>,
    sequence_id: SequenceId,
    quit_when_idle: QuitHandle,
}

impl PooledSingleThreadTaskRunner {
    /// Spawn the runner's thread. Returns the runner and the thread handle,
    /// which the pool keeps so it can join the thread.
    pub(crate) fn spawn(
        pool: &Arc<PoolInner>,
        traits: TaskTraits,
        thread_name: String,
    ) -> EngineResult<(Arc<Self>, JoinHandle<()>)> {
        let (sender, receiver) = crossbeam::channel::bounded(1);
        let tracker = pool.tracker().clone();
        let registry = pool.registry().clone();
        let thread_names = pool.thread_names().clone();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                thread_names.set_name_for_current_thread(&thread_name);
                let manager =
                    SequenceManager::with_tracker(Arc::new(DefaultPump::new()), tracker, traits);
                let sequence = manager.sequence().clone();
                registry.register(&sequence);

                let run_loop = RunLoop::new();
                let start = (manager.task_runner(), sequence.id(), run_loop.quit_when_idle_handle());
                if sender.send(start).is_ok() {
                    tracing::trace!(thread = %thread_name, "Single-thread runner started");
                    run_loop.run();
                }

                registry.unregister(sequence.id());
                drop(run_loop);
                drop(manager);
                thread_names.remove_current_thread();
                tracing::trace!(thread = %thread_name, "Single-thread runner exiting");
            })
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to spawn single-thread runner");
                EngineError::WorkerSpawn(e)
            })?;

        let (runner, sequence_id, quit_when_idle) = receiver.recv().map_err(|_| {
            EngineError::WorkerSpawn(io::Error::other("single-thread runner exited during start-up"))
        })?;

        let runner = Arc::new(Self {
            runner,
            sequence_id,
            quit_when_idle,
        });
        Ok((runner, handle))
    }

    /// Id of the sequence the runner's tasks run in
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    pub(crate) fn quit_when_idle_handle(&self) -> QuitHandle {
        self.quit_when_idle.clone()
    }
}

impl TaskRunner for PooledSingleThreadTaskRunner {
    fn post_delayed_task(&self, from_here: Location, task: OnceClosure, delay: Duration) -> bool {
        self.runner.post_delayed_task(from_here, task, delay)
    }

    fn runs_tasks_in_current_sequence(&self) -> bool {
        self.runner.runs_tasks_in_current_sequence()
    }
}

impl SequencedTaskRunner for PooledSingleThreadTaskRunner {}

impl SingleThreadTaskRunner for PooledSingleThreadTaskRunner {}

impl Drop for PooledSingleThreadTaskRunner {
    fn drop(&mut self) {
        self.quit_when_idle.quit();
    }
}
