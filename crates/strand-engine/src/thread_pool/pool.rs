//! Thread pool facade

use crate::config::ThreadPoolConfig;
use crate::error::EngineResult;
use crate::location::Location;
use crate::sequence::Sequence;
use crate::sequence_manager::QuitHandle;
use crate::task::{OnceClosure, Task, TaskPriority, TaskTraits};
use crate::thread_pool::delayed_service::DelayedTaskService;
use crate::thread_pool::pooled_runner::{PooledParallelTaskRunner, PooledSequencedTaskRunner};
use crate::thread_pool::registry::SequenceRegistry;
use crate::thread_pool::single_thread::PooledSingleThreadTaskRunner;
use crate::thread_pool::task_tracker::TaskTracker;
use crate::thread_pool::thread_group::{ThreadGroup, ThreadGroupStats};
use crate::thread_registry::ThreadNameRegistry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Dedicated thread of a single-thread runner
struct SingleThread {
    quit_when_idle: QuitHandle,
    handle: JoinHandle<()>,
}

/// State shared by the pool and its runners
pub(crate) struct PoolInner {
    config: ThreadPoolConfig,
    group: Arc<ThreadGroup>,
    tracker: Arc<TaskTracker>,
    registry: Arc<SequenceRegistry>,
    thread_names: Arc<ThreadNameRegistry>,
    delayed: Arc<DelayedTaskService>,

    single_threads: Mutex<Vec<SingleThread>>,
    next_single_thread_id: AtomicUsize,

    started: AtomicBool,
    self_ref: Weak<PoolInner>,
}

impl PoolInner {
    pub(crate) fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    pub(crate) fn registry(&self) -> &Arc<SequenceRegistry> {
        &self.registry
    }

    pub(crate) fn thread_names(&self) -> &Arc<ThreadNameRegistry> {
        &self.thread_names
    }

    /// Traits after pool-wide feature overrides
    fn effective_traits(&self, traits: TaskTraits) -> TaskTraits {
        if self.config.features.all_tasks_user_blocking {
            traits.with_priority(TaskPriority::UserBlocking)
        } else {
            traits
        }
    }

    /// Post `task` to `sequence`. Returns `false` if the pool rejects it.
    pub(crate) fn post_task_to_sequence(&self, sequence: Arc<Sequence>, task: Task) -> bool {
        if !self.tracker.will_post_task(task.traits()) {
            tracing::trace!(posted_from = %task.posted_from(), "Rejected task after shutdown");
            return false;
        }

        match task.delayed_run_time() {
            None => {
                self.push_now(sequence, task);
                true
            }
            Some(due) => {
                let pool = self.self_ref.clone();
                self.delayed.schedule(
                    due,
                    Box::new(move || {
                        if let Some(pool) = pool.upgrade() {
                            pool.push_now(sequence, task);
                        }
                    }),
                )
            }
        }
    }

    fn push_now(&self, sequence: Arc<Sequence>, task: Task) {
        self.tracker.will_queue_task();
        if sequence.push_task(task) {
            self.group.enqueue(sequence);
        }
    }
}

/// Pool of worker threads running tasks posted through its runners
///
/// Dropping the pool shuts it down and joins its threads.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Create a pool. Threads are spawned by [`start`](ThreadPool::start).
    pub fn new(config: ThreadPoolConfig) -> EngineResult<Self> {
        Self::with_thread_names(config, Arc::new(ThreadNameRegistry::new()))
    }

    /// Create a pool that records its thread names in `thread_names`
    pub fn with_thread_names(
        config: ThreadPoolConfig,
        thread_names: Arc<ThreadNameRegistry>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let tracker = Arc::new(TaskTracker::new());
        let registry = Arc::new(SequenceRegistry::new());
        let delayed = DelayedTaskService::new();
        let group = ThreadGroup::new(
            &config,
            tracker.clone(),
            registry.clone(),
            thread_names.clone(),
            delayed.clone(),
        );

        let inner = Arc::new_cyclic(|self_ref| PoolInner {
            config,
            group,
            tracker,
            registry,
            thread_names,
            delayed,
            single_threads: Mutex::new(Vec::new()),
            next_single_thread_id: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        });
        Ok(Self { inner })
    }

    /// Start the delayed task service and the workers needed for the work
    /// posted so far. Calling it again is a no-op.
    pub fn start(&self) -> EngineResult<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let prefix = &self.inner.config.thread_name_prefix;
        self.inner.delayed.start(format!("{}-delayed", prefix))?;
        self.inner.group.start()?;

        tracing::debug!(
            max_threads = self.inner.config.max_threads,
            initial_capacity = self.inner.config.initial_capacity,
            "Thread pool started"
        );
        Ok(())
    }

    /// Whether [`start`](ThreadPool::start) was called
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Post a task with its own sequence
    pub fn post_task(&self, from_here: Location, traits: TaskTraits, task: OnceClosure) -> bool {
        self.post_delayed_task(from_here, traits, task, Duration::ZERO)
    }

    /// Post a task with its own sequence, to run after `delay`
    pub fn post_delayed_task(
        &self,
        from_here: Location,
        traits: TaskTraits,
        task: OnceClosure,
        delay: Duration,
    ) -> bool {
        let traits = self.inner.effective_traits(traits);
        let sequence = Sequence::new(traits);
        let task = Task::new(from_here, traits, task, delay);
        self.inner.post_task_to_sequence(sequence, task)
    }

    /// Runner whose tasks may run concurrently
    pub fn create_task_runner(&self, traits: TaskTraits) -> Arc<PooledParallelTaskRunner> {
        PooledParallelTaskRunner::new(self.inner.clone(), self.inner.effective_traits(traits))
    }

    /// Runner whose tasks run one at a time in posting order
    pub fn create_sequenced_task_runner(&self, traits: TaskTraits) -> Arc<PooledSequencedTaskRunner> {
        PooledSequencedTaskRunner::new(self.inner.clone(), self.inner.effective_traits(traits))
    }

    /// Runner whose tasks all run on one dedicated thread
    pub fn create_single_thread_task_runner(
        &self,
        traits: TaskTraits,
    ) -> EngineResult<Arc<PooledSingleThreadTaskRunner>> {
        let id = self.inner.next_single_thread_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-single-{}", self.inner.config.thread_name_prefix, id);
        let (runner, handle) =
            PooledSingleThreadTaskRunner::spawn(&self.inner, self.inner.effective_traits(traits), name)?;

        self.inner.single_threads.lock().push(SingleThread {
            quit_when_idle: runner.quit_when_idle_handle(),
            handle,
        });
        Ok(runner)
    }

    /// Shut the pool down.
    ///
    /// Returns once every accepted `BlockShutdown` task has run. Tasks that
    /// did not start yet are discarded unless they block shutdown. Posts made
    /// afterwards are rejected. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.tracker.is_shutdown_completed() {
            return;
        }
        if let Err(e) = self.start() {
            tracing::warn!(error = %e, "Could not start pool to drain shutdown");
        }

        inner.tracker.start_shutdown();
        inner.tracker.wait_for_shutdown_drain();
        inner.tracker.complete_shutdown();
        inner.delayed.stop();
        tracing::debug!("Thread pool shut down");
    }

    /// Block until every queued task has run or been discarded. Delayed
    /// tasks that are not due yet are not waited for.
    pub fn flush_for_testing(&self) {
        self.inner.tracker.flush_for_testing();
    }

    /// Shut down, then join every worker and single-thread runner thread
    pub fn join_for_testing(&self) {
        self.shutdown();
        self.join_threads();
    }

    fn join_threads(&self) {
        let single_threads = std::mem::take(&mut *self.inner.single_threads.lock());
        let current = thread::current().id();
        for single in single_threads {
            single.quit_when_idle.quit();
            if single.handle.thread().id() != current {
                let _ = single.handle.join();
            }
        }

        self.inner.group.request_exit();
        self.inner.group.join_all();
    }

    /// Number of sequences registered by sequenced and single-thread runners
    pub fn registered_sequence_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of live worker threads
    pub fn worker_count(&self) -> usize {
        self.inner.group.stats().workers
    }

    /// Worker group counters
    pub fn stats(&self) -> ThreadGroupStats {
        self.inner.group.stats()
    }

    /// Registry holding the names of the pool's threads
    pub fn thread_names(&self) -> &Arc<ThreadNameRegistry> {
        &self.inner.thread_names
    }

    /// Configuration the pool was created with
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.inner.config
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();

        // Threads still inside a ContinueOnShutdown task are detached, not joined
        for single in std::mem::take(&mut *self.inner.single_threads.lock()) {
            single.quit_when_idle.quit();
        }
        self.inner.group.request_exit();
        let detached = self.inner.group.detach_all();
        tracing::trace!(workers = detached, "Detached worker threads");

        let outliving = self.inner.registry.live_sequences();
        if !outliving.is_empty() {
            tracing::debug!(
                sequences = outliving.len(),
                "Sequenced runners outlive their pool; further posts are rejected"
            );
        }

        let discarded = self.inner.group.clear_ready();
        if !discarded.is_empty() {
            tracing::debug!(sequences = discarded.len(), "Dropping unprocessed sequences");
        }
    }
}
