//! Task runner posting to a loop

use crate::location::Location;
use crate::runner::{SequencedTaskRunner, SingleThreadTaskRunner, TaskRunner};
use crate::sequence_manager::manager::LoopShared;
use crate::task::OnceClosure;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Posts tasks to a [`SequenceManager`](crate::sequence_manager::SequenceManager)
///
/// May be cloned and used from any thread. Tasks run on the manager's
/// thread in posting order, delayed tasks once due. Posts fail once the
/// manager is destroyed.
pub struct LoopTaskRunner {
    shared: Arc<LoopShared>,
}

impl LoopTaskRunner {
    pub(crate) fn new(shared: Arc<LoopShared>) -> Self {
        Self { shared }
    }
}

impl TaskRunner for LoopTaskRunner {
    fn post_delayed_task(&self, from_here: Location, task: OnceClosure, delay: Duration) -> bool {
        self.shared.post_task(from_here, task, delay)
    }

    fn runs_tasks_in_current_sequence(&self) -> bool {
        thread::current().id() == self.shared.thread_id() && self.shared.is_accepting()
    }
}

impl SequencedTaskRunner for LoopTaskRunner {}

impl SingleThreadTaskRunner for LoopTaskRunner {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TaskRunnerExt;
    use crate::sequence_manager::{RunLoop, SequenceManager};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_belongs_to_bound_thread_only() {
        let manager = SequenceManager::new();
        let runner = manager.task_runner();
        assert!(runner.belongs_to_current_thread());

        let r = runner.clone();
        let other = thread::spawn(move || r.runs_tasks_in_current_sequence())
            .join()
            .unwrap();
        assert!(!other);
    }

    #[test]
    fn test_post_from_other_thread_runs_on_loop_thread() {
        let manager = SequenceManager::new();
        let runner = manager.task_runner();
        let loop_thread = thread::current().id();

        let ran_on_loop = Arc::new(AtomicBool::new(false));
        let run_loop = RunLoop::new();
        let quit = run_loop.quit_handle();
        let flag = ran_on_loop.clone();
        let r = runner.clone();
        thread::spawn(move || {
            r.post(crate::from_here!(), move || {
                flag.store(thread::current().id() == loop_thread, Ordering::SeqCst);
                quit.quit();
            });
        })
        .join()
        .unwrap();

        run_loop.run();
        assert!(ran_on_loop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_post_with_huge_delay() {
        let manager = SequenceManager::new();
        let runner = manager.task_runner();
        let ran = Arc::new(AtomicBool::new(false));

        let r = ran.clone();
        assert!(runner.post_delayed(
            crate::from_here!(),
            move || r.store(true, Ordering::SeqCst),
            Duration::MAX,
        ));
        assert!(runner.post(crate::from_here!(), || {}));

        RunLoop::new().run_until_idle();
        assert!(!ran.load(Ordering::SeqCst));
        assert!(manager.is_idle_for_testing());
    }
}
