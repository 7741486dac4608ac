//! Elastic group of worker threads sharing one ready queue
//!
//! Workers are spawned lazily, one per ready sequence that no idle worker can
//! take, up to `max_tasks`. A worker idle for the reclaim time exits unless
//! the group is at its floor. Tasks inside a [`ScopedBlockingCall`] raise
//! `max_tasks` by one while they are blocked.
//!
//! [`ScopedBlockingCall`]: crate::thread_pool::ScopedBlockingCall

use crate::config::{MayBlockPolicy, ThreadPoolConfig};
use crate::error::{EngineError, EngineResult};
use crate::sequence::{DidRunTask, Sequence};
use crate::thread_pool::blocking::BlockingType;
use crate::thread_pool::delayed_service::DelayedTaskService;
use crate::thread_pool::priority_queue::PriorityQueue;
use crate::thread_pool::registry::SequenceRegistry;
use crate::thread_pool::task_tracker::TaskTracker;
use crate::thread_pool::worker;
use crate::thread_registry::ThreadNameRegistry;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Identifies one registered blocking call
pub(crate) type BlockingToken = u64;

struct GroupState {
    /// Sequences waiting for a worker
    ready: PriorityQueue,

    /// Live workers by id
    workers: FxHashMap<usize, JoinHandle<()>>,
    next_worker_id: usize,

    /// Workers waiting in `get_work`
    idle_workers: usize,

    /// Tasks currently running
    running_tasks: usize,

    /// Concurrency limit, including compensation for blocked tasks
    max_tasks: usize,

    /// Blocking calls in progress, and whether each raised `max_tasks`
    blocked: FxHashMap<BlockingToken, bool>,
    next_blocking_token: BlockingToken,

    started: bool,
    exiting: bool,
}

/// Counters exposed for tests and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadGroupStats {
    /// Live worker threads
    pub workers: usize,
    /// Workers waiting for work
    pub idle_workers: usize,
    /// Tasks currently running
    pub running_tasks: usize,
    /// Current concurrency limit
    pub max_tasks: usize,
    /// Sequences waiting for a worker
    pub ready_sequences: usize,
}

/// Worker pool with a priority ready queue
pub(crate) struct ThreadGroup {
    state: Mutex<GroupState>,
    /// Signalled when work is queued or on exit
    work_available: Condvar,

    base_max_tasks: usize,
    reclaim_floor: usize,
    reclaim_time: Duration,
    may_block_policy: MayBlockPolicy,
    thread_name_prefix: String,

    tracker: Arc<TaskTracker>,
    registry: Arc<SequenceRegistry>,
    thread_names: Arc<ThreadNameRegistry>,
    delayed: Arc<DelayedTaskService>,

    self_ref: Weak<ThreadGroup>,
}

impl ThreadGroup {
    pub(crate) fn new(
        config: &ThreadPoolConfig,
        tracker: Arc<TaskTracker>,
        registry: Arc<SequenceRegistry>,
        thread_names: Arc<ThreadNameRegistry>,
        delayed: Arc<DelayedTaskService>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: Mutex::new(GroupState {
                ready: PriorityQueue::new(),
                workers: FxHashMap::default(),
                next_worker_id: 0,
                idle_workers: 0,
                running_tasks: 0,
                max_tasks: config.max_threads,
                blocked: FxHashMap::default(),
                next_blocking_token: 0,
                started: false,
                exiting: false,
            }),
            work_available: Condvar::new(),
            base_max_tasks: config.max_threads,
            reclaim_floor: config.reclaim_floor(),
            reclaim_time: config.reclaim_time(),
            may_block_policy: config.may_block_policy(),
            thread_name_prefix: config.thread_name_prefix.clone(),
            tracker,
            registry,
            thread_names,
            delayed,
            self_ref: self_ref.clone(),
        })
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub(crate) fn thread_names(&self) -> &ThreadNameRegistry {
        &self.thread_names
    }

    /// Spawn workers for the work queued so far. Calling it again is a no-op.
    pub(crate) fn start(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.started {
            return Ok(());
        }
        state.started = true;

        let wanted = state.ready.len().min(state.max_tasks);
        while state.workers.len() < wanted {
            self.spawn_worker(&mut state)?;
        }
        Ok(())
    }

    /// Queue a sequence that became schedulable
    pub(crate) fn enqueue(&self, sequence: Arc<Sequence>) {
        let mut state = self.state.lock();
        state.ready.push(sequence);
        self.wake_or_spawn(&mut state);
    }

    fn wake_or_spawn(&self, state: &mut GroupState) {
        if !state.started || state.exiting {
            return;
        }
        if state.idle_workers > 0 {
            self.work_available.notify_one();
        }
        if state.ready.len() > state.idle_workers && state.workers.len() < state.max_tasks {
            if let Err(e) = self.spawn_worker(state) {
                // Already logged; existing workers keep serving the queue
                tracing::trace!(error = %e, "Continuing with existing capacity");
            }
        }
    }

    fn spawn_worker(&self, state: &mut GroupState) -> EngineResult<()> {
        let Some(group) = self.self_ref.upgrade() else {
            return Ok(());
        };
        let id = state.next_worker_id;

        let handle = thread::Builder::new()
            .name(format!("{}-worker-{}", self.thread_name_prefix, id))
            .spawn(move || worker::run(group, id))
            .map_err(|e| {
                tracing::warn!(
                    worker = id,
                    workers = state.workers.len(),
                    error = %e,
                    "Failed to spawn worker thread"
                );
                EngineError::WorkerSpawn(e)
            })?;

        state.next_worker_id += 1;
        state.workers.insert(id, handle);
        tracing::debug!(worker = id, workers = state.workers.len(), "Spawned worker");
        Ok(())
    }

    /// Wait for a ready sequence. Returns `None` when the worker must exit.
    pub(crate) fn get_work(&self, worker_id: usize) -> Option<Arc<Sequence>> {
        let mut state = self.state.lock();
        let mut idle_since = Instant::now();

        loop {
            if state.running_tasks < state.max_tasks {
                if let Some(sequence) = state.ready.pop() {
                    state.running_tasks += 1;
                    return Some(sequence);
                }
            }
            if state.exiting {
                return None;
            }

            let idle_for = idle_since.elapsed();
            if idle_for >= self.reclaim_time {
                if state.ready.is_empty() && state.workers.len() > self.reclaim_floor {
                    // Detach: nobody joins a reclaimed worker
                    state.workers.remove(&worker_id);
                    tracing::debug!(
                        worker = worker_id,
                        workers = state.workers.len(),
                        "Reclaiming idle worker"
                    );
                    return None;
                }
                idle_since = Instant::now();
                continue;
            }

            state.idle_workers += 1;
            self.work_available
                .wait_for(&mut state, self.reclaim_time - idle_for);
            state.idle_workers -= 1;
        }
    }

    /// Called by a worker after running (or discarding) one task of `sequence`
    pub(crate) fn did_process_sequence(&self, sequence: Arc<Sequence>, outcome: DidRunTask) {
        {
            let mut state = self.state.lock();
            state.running_tasks -= 1;

            match outcome {
                DidRunTask::Reenqueue => {
                    // Back of its band; this worker or an idle one picks it up
                    state.ready.push(sequence);
                    return;
                }
                DidRunTask::Idle | DidRunTask::Retire => {
                    if !state.ready.is_empty() && state.idle_workers > 0 {
                        self.work_available.notify_one();
                    }
                }
            }
        }

        if outcome == DidRunTask::Retire {
            self.registry.unregister(sequence.id());
        }
        // May run the sequence's Drop, which takes other locks
        drop(sequence);
    }

    /// Register a blocking call of the running task
    pub(crate) fn blocking_started(&self, blocking_type: BlockingType) -> BlockingToken {
        let mut state = self.state.lock();
        let token = state.next_blocking_token;
        state.next_blocking_token += 1;

        let threshold = match (blocking_type, self.may_block_policy) {
            (BlockingType::WillBlock, _) | (_, MayBlockPolicy::WithoutDelay) => None,
            (BlockingType::MayBlock, MayBlockPolicy::Threshold(threshold)) => Some(threshold),
        };

        match threshold {
            None => {
                state.blocked.insert(token, true);
                self.increment_max_tasks(&mut state);
            }
            Some(threshold) => {
                state.blocked.insert(token, false);
                drop(state);

                let group = self.self_ref.clone();
                self.delayed.schedule_after(
                    threshold,
                    Box::new(move || {
                        if let Some(group) = group.upgrade() {
                            group.blocking_threshold_reached(token);
                        }
                    }),
                );
            }
        }
        token
    }

    fn blocking_threshold_reached(&self, token: BlockingToken) {
        let mut state = self.state.lock();
        if let Some(raised) = state.blocked.get_mut(&token) {
            if !*raised {
                *raised = true;
                self.increment_max_tasks(&mut state);
            }
        }
    }

    fn increment_max_tasks(&self, state: &mut GroupState) {
        state.max_tasks += 1;
        tracing::trace!(max_tasks = state.max_tasks, "Raised capacity for blocked task");
        if !state.ready.is_empty() {
            self.wake_or_spawn(state);
        }
    }

    /// Unregister a blocking call
    pub(crate) fn blocking_ended(&self, token: BlockingToken) {
        let mut state = self.state.lock();
        if state.blocked.remove(&token) == Some(true) {
            state.max_tasks -= 1;
            debug_assert!(state.max_tasks >= self.base_max_tasks);
        }
    }

    /// Tell every worker to exit once the ready queue is empty
    pub(crate) fn request_exit(&self) {
        let mut state = self.state.lock();
        state.exiting = true;
        self.work_available.notify_all();
    }

    /// Join every worker that has not been reclaimed. Workers that are the
    /// calling thread are detached instead.
    pub(crate) fn join_all(&self) {
        let workers: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock();
            state.workers.drain().map(|(_, handle)| handle).collect()
        };

        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }

    /// Forget every worker handle without waiting. Workers busy with a task
    /// exit once it returns.
    pub(crate) fn detach_all(&self) -> usize {
        let mut state = self.state.lock();
        let detached = state.workers.len();
        state.workers.clear();
        detached
    }

    /// Drop every queued sequence without running it
    pub(crate) fn clear_ready(&self) -> Vec<Arc<Sequence>> {
        self.state.lock().ready.drain()
    }

    pub(crate) fn stats(&self) -> ThreadGroupStats {
        let state = self.state.lock();
        ThreadGroupStats {
            workers: state.workers.len(),
            idle_workers: state.idle_workers,
            running_tasks: state.running_tasks,
            max_tasks: state.max_tasks,
            ready_sequences: state.ready.len(),
        }
    }
}
