//! Ready queue of sequences, banded by priority

use crate::sequence::Sequence;
use crate::task::TaskPriority;
use std::collections::VecDeque;
use std::sync::Arc;

const BAND_COUNT: usize = TaskPriority::HIGHEST_FIRST.len();

/// Sequences waiting for a worker
///
/// Higher bands are always served first. Within a band sequences are served
/// in insertion order, and a sequence that still has work goes back to the
/// tail of its band, which gives round-robin between busy sequences.
pub(crate) struct PriorityQueue {
    bands: [VecDeque<Arc<Sequence>>; BAND_COUNT],
    len: usize,
}

impl PriorityQueue {
    pub(crate) fn new() -> Self {
        Self {
            bands: std::array::from_fn(|_| VecDeque::new()),
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, sequence: Arc<Sequence>) {
        self.bands[sequence.priority().band()].push_back(sequence);
        self.len += 1;
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<Sequence>> {
        let sequence = self.bands.iter_mut().find_map(VecDeque::pop_front)?;
        self.len -= 1;
        Some(sequence)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<Sequence>> {
        self.len = 0;
        self.bands.iter_mut().flat_map(|band| band.drain(..)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskTraits;

    fn sequence(priority: TaskPriority) -> Arc<Sequence> {
        Sequence::new(TaskTraits::from(priority))
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = PriorityQueue::new();
        let low = sequence(TaskPriority::BestEffort);
        let mid = sequence(TaskPriority::UserVisible);
        let high = sequence(TaskPriority::UserBlocking);
        queue.push(low.clone());
        queue.push(mid.clone());
        queue.push(high.clone());

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().id(), high.id());
        assert_eq!(queue.pop().unwrap().id(), mid.id());
        assert_eq!(queue.pop().unwrap().id(), low.id());
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_within_band() {
        let mut queue = PriorityQueue::new();
        let first = sequence(TaskPriority::UserVisible);
        let second = sequence(TaskPriority::UserVisible);
        queue.push(first.clone());
        queue.push(second.clone());

        let popped = queue.pop().unwrap();
        assert_eq!(popped.id(), first.id());
        // Re-inserted sequences go behind the ones already waiting
        queue.push(popped);
        assert_eq!(queue.pop().unwrap().id(), second.id());
        assert_eq!(queue.pop().unwrap().id(), first.id());
    }

    #[test]
    fn test_drain() {
        let mut queue = PriorityQueue::new();
        queue.push(sequence(TaskPriority::BestEffort));
        queue.push(sequence(TaskPriority::UserBlocking));
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }
}
