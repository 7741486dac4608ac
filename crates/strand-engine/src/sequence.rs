//! Sequences: single-flight FIFO task queues
//!
//! A [`Sequence`] never runs two of its tasks at the same time. Dispatchers
//! claim a sequence with [`Sequence::try_claim`], which is a single
//! compare-and-swap, before taking a task from it. Tasks of different
//! sequences may run fully in parallel.
//!
//! ## Protocol
//!
//! 1. `push_task` returns `true` when the sequence became schedulable. The
//!    caller then hands the sequence to its dispatcher exactly once.
//! 2. The dispatcher calls `try_claim`, then `take_task`, runs the task.
//! 3. `did_run_task` releases the claim and says whether the sequence must be
//!    re-enqueued, went idle, or can be retired from the registry.

use crate::task::{Task, TaskPriority, TaskTraits};
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Unique identifier for a Sequence
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SequenceId(u64);

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

impl SequenceId {
    fn next() -> Self {
        SequenceId(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Something that keeps track of the sequences it created
///
/// A sequence holds a weak reference to its owner and unregisters itself
/// when it is destroyed.
pub trait SequenceOwner: Send + Sync {
    /// Called when the sequence `id` is destroyed
    fn unregister_sequence(&self, id: SequenceId);
}

/// Outcome of [`Sequence::did_run_task`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DidRunTask {
    /// More tasks are queued; the sequence must go back to the ready queue
    Reenqueue,
    /// The queue is empty; the sequence waits for the next push
    Idle,
    /// The queue is empty and the owning runner is gone
    Retire,
}

struct SequenceState {
    queue: VecDeque<Task>,
    /// In a ready queue or claimed by a dispatcher
    scheduled: bool,
    /// The owning runner was dropped while tasks were pending
    orphaned: bool,
}

/// An ordered queue of tasks that never runs two of them concurrently
pub struct Sequence {
    id: SequenceId,
    traits: TaskTraits,
    state: Mutex<SequenceState>,
    claimed: AtomicBool,
    owner: Option<Weak<dyn SequenceOwner>>,
}

impl Sequence {
    /// Create a sequence without an owner
    pub fn new(traits: TaskTraits) -> Arc<Self> {
        Arc::new(Self::build(traits, None))
    }

    /// Create a sequence that unregisters from `owner` when destroyed
    pub fn with_owner(traits: TaskTraits, owner: Weak<dyn SequenceOwner>) -> Arc<Self> {
        Arc::new(Self::build(traits, Some(owner)))
    }

    fn build(traits: TaskTraits, owner: Option<Weak<dyn SequenceOwner>>) -> Self {
        Self {
            id: SequenceId::next(),
            traits,
            state: Mutex::new(SequenceState {
                queue: VecDeque::new(),
                scheduled: false,
                orphaned: false,
            }),
            claimed: AtomicBool::new(false),
            owner,
        }
    }

    /// Sequence identifier
    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Traits inherited from the owning runner
    pub fn traits(&self) -> &TaskTraits {
        &self.traits
    }

    /// Priority used to order this sequence in ready queues
    pub fn priority(&self) -> TaskPriority {
        self.traits.priority()
    }

    /// Append a task.
    ///
    /// Returns `true` if the sequence transitioned from idle to needing
    /// scheduling. Returns `false` when it is already queued or running; the
    /// dispatcher holding it will see the new task.
    pub fn push_task(&self, task: Task) -> bool {
        let mut state = self.state.lock();
        state.queue.push_back(task);

        if state.scheduled {
            false
        } else {
            state.scheduled = true;
            true
        }
    }

    /// Claim the sequence for execution. Only one claim can be held at a time.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a dispatcher currently holds the claim
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Pop the next task. The caller must hold the claim.
    pub fn take_task(&self) -> Option<Task> {
        debug_assert!(self.is_claimed(), "take_task without holding the claim");
        self.state.lock().queue.pop_front()
    }

    /// Release the claim after running (or discarding) a task
    pub fn did_run_task(&self) -> DidRunTask {
        let mut state = self.state.lock();
        self.claimed.store(false, Ordering::Release);

        if !state.queue.is_empty() {
            return DidRunTask::Reenqueue;
        }

        state.scheduled = false;
        if state.orphaned {
            DidRunTask::Retire
        } else {
            DidRunTask::Idle
        }
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether no tasks are queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Mark the owning runner as gone.
    ///
    /// Returns `true` if the sequence is idle and can be unregistered right
    /// away. Otherwise the sequence is retired by the dispatcher once drained.
    pub(crate) fn orphan(&self) -> bool {
        let mut state = self.state.lock();
        if !state.scheduled && state.queue.is_empty() {
            true
        } else {
            state.orphaned = true;
            false
        }
    }

    /// Remove every queued task regardless of the claim
    pub(crate) fn discard_all(&self) -> Vec<Task> {
        self.state.lock().queue.drain(..).collect()
    }
}

impl Drop for Sequence {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
            owner.unregister_sequence(self.id);
        }
    }
}

thread_local! {
    static CURRENT_SEQUENCE: Cell<Option<SequenceId>> = const { Cell::new(None) };
}

/// The sequence whose task is running on this thread, if any
pub fn current_sequence_id() -> Option<SequenceId> {
    CURRENT_SEQUENCE.with(|current| current.get())
}

/// Marks the current thread as running a task of a sequence
pub(crate) struct ScopedSequenceContext {
    previous: Option<SequenceId>,
}

impl ScopedSequenceContext {
    pub(crate) fn enter(id: SequenceId) -> Self {
        let previous = CURRENT_SEQUENCE.with(|current| current.replace(Some(id)));
        Self { previous }
    }
}

impl Drop for ScopedSequenceContext {
    fn drop(&mut self) {
        CURRENT_SEQUENCE.with(|current| current.set(self.previous));
    }
}
