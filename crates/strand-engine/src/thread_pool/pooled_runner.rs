//! Runners posting to the worker pool

use crate::location::Location;
use crate::runner::{SequencedTaskRunner, TaskRunner};
use crate::sequence::{current_sequence_id, Sequence, SequenceId, SequenceOwner};
use crate::task::{OnceClosure, Task, TaskTraits};
use crate::thread_pool::pool::PoolInner;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Runner whose tasks may run concurrently and in any order
///
/// Every post gets its own one-task sequence. The runner remembers the
/// sequences it created until they are destroyed, which is how it answers
/// [`runs_tasks_in_current_sequence`](TaskRunner::runs_tasks_in_current_sequence).
pub struct PooledParallelTaskRunner {
    pool: Arc<PoolInner>,
    traits: TaskTraits,
    sequences: Mutex<FxHashSet<SequenceId>>,
    self_ref: Weak<PooledParallelTaskRunner>,
}

impl PooledParallelTaskRunner {
    pub(crate) fn new(pool: Arc<PoolInner>, traits: TaskTraits) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            pool,
            traits,
            sequences: Mutex::new(FxHashSet::default()),
            self_ref: self_ref.clone(),
        })
    }

    /// Traits applied to every task posted through this runner
    pub fn traits(&self) -> &TaskTraits {
        &self.traits
    }

    /// Number of sequences created by this runner that are still alive
    pub fn alive_sequence_count(&self) -> usize {
        self.sequences.lock().len()
    }
}

impl SequenceOwner for PooledParallelTaskRunner {
    fn unregister_sequence(&self, id: SequenceId) {
        self.sequences.lock().remove(&id);
    }
}

impl TaskRunner for PooledParallelTaskRunner {
    fn post_delayed_task(&self, from_here: Location, task: OnceClosure, delay: Duration) -> bool {
        let owner: Weak<dyn SequenceOwner> = self.self_ref.clone();
        let sequence = Sequence::with_owner(self.traits, owner);
        self.sequences.lock().insert(sequence.id());

        let task = Task::new(from_here, self.traits, task, delay);
        self.pool.post_task_to_sequence(sequence, task)
    }

    fn runs_tasks_in_current_sequence(&self) -> bool {
        match current_sequence_id() {
            Some(id) => self.sequences.lock().contains(&id),
            None => false,
        }
    }
}

/// Runner whose tasks run one at a time in posting order, on any worker
///
/// Owns one sequence, registered with the pool for the runner's lifetime.
pub struct PooledSequencedTaskRunner {
    pool: Arc<PoolInner>,
    sequence: Arc<Sequence>,
}

impl PooledSequencedTaskRunner {
    pub(crate) fn new(pool: Arc<PoolInner>, traits: TaskTraits) -> Arc<Self> {
        let sequence = Sequence::new(traits);
        pool.registry().register(&sequence);
        Arc::new(Self { pool, sequence })
    }

    /// Id of the runner's sequence
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence.id()
    }

    /// Traits applied to every task posted through this runner
    pub fn traits(&self) -> &TaskTraits {
        self.sequence.traits()
    }
}

impl TaskRunner for PooledSequencedTaskRunner {
    fn post_delayed_task(&self, from_here: Location, task: OnceClosure, delay: Duration) -> bool {
        let task = Task::new(from_here, *self.sequence.traits(), task, delay);
        self.pool.post_task_to_sequence(self.sequence.clone(), task)
    }

    fn runs_tasks_in_current_sequence(&self) -> bool {
        current_sequence_id() == Some(self.sequence.id())
    }
}

impl SequencedTaskRunner for PooledSequencedTaskRunner {}

impl Drop for PooledSequencedTaskRunner {
    fn drop(&mut self) {
        self.pool.registry().release(&self.sequence);
    }
}
