//! Registry of the sequences owned by sequenced runners
//!
//! One lock per pool, shared by all of its runners.

use crate::sequence::{Sequence, SequenceId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};

/// Tracks the live sequences of a pool's sequenced runners
pub struct SequenceRegistry {
    sequences: Mutex<FxHashMap<SequenceId, Weak<Sequence>>>,
}

impl SequenceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sequences: Mutex::new(FxHashMap::default()),
        }
    }

    /// Register a sequence. Registering the same sequence twice aborts.
    pub fn register(&self, sequence: &Arc<Sequence>) {
        let mut sequences = self.sequences.lock();
        if sequences.contains_key(&sequence.id()) {
            drop(sequences);
            crate::contract_violation!(
                sequence = sequence.id().as_u64(),
                "Sequence registered twice"
            );
        }
        sequences.insert(sequence.id(), Arc::downgrade(sequence));
    }

    /// Forget a sequence. Returns `false` if it was not registered.
    pub fn unregister(&self, id: SequenceId) -> bool {
        self.sequences.lock().remove(&id).is_some()
    }

    /// Called when the runner owning `sequence` goes away.
    ///
    /// An idle sequence is unregistered at once. A busy one is marked orphaned
    /// and unregistered by the worker that drains it.
    pub fn release(&self, sequence: &Sequence) {
        if sequence.orphan() {
            self.unregister(sequence.id());
        }
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: SequenceId) -> bool {
        self.sequences.lock().contains_key(&id)
    }

    /// Strong references to every registered sequence still alive
    pub fn live_sequences(&self) -> Vec<Arc<Sequence>> {
        self.sequences
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Number of registered sequences
    pub fn len(&self) -> usize {
        self.sequences.lock().len()
    }

    /// Whether no sequence is registered
    pub fn is_empty(&self) -> bool {
        self.sequences.lock().is_empty()
    }
}

impl Default for SequenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskTraits};
    use std::time::Duration;

    #[test]
    fn test_register_and_release_idle() {
        let registry = SequenceRegistry::new();
        let sequence = Sequence::new(TaskTraits::new());
        registry.register(&sequence);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(sequence.id()));

        registry.release(&sequence);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_busy_sequence_defers() {
        let registry = SequenceRegistry::new();
        let sequence = Sequence::new(TaskTraits::new());
        registry.register(&sequence);
        sequence.push_task(Task::new(
            crate::from_here!(),
            TaskTraits::new(),
            Box::new(|| {}),
            Duration::ZERO,
        ));

        registry.release(&sequence);
        assert_eq!(registry.len(), 1);

        assert!(sequence.try_claim());
        sequence.take_task();
        assert_eq!(sequence.did_run_task(), crate::sequence::DidRunTask::Retire);
        assert!(registry.unregister(sequence.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_live_sequences_skip_dropped() {
        let registry = SequenceRegistry::new();
        let kept = Sequence::new(TaskTraits::new());
        let dropped = Sequence::new(TaskTraits::new());
        registry.register(&kept);
        registry.register(&dropped);
        drop(dropped);

        let live = registry.live_sequences();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), kept.id());
    }
}
