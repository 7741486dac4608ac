//! Time-ordered queue of not-yet-eligible work
//!
//! Entries are ordered by due time, ties broken by insertion order so that
//! equal-time entries keep FIFO order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Entry in the delayed heap
struct DelayedEntry<T> {
    /// When the payload becomes eligible
    due: Instant,
    /// Insertion order, for FIFO among equal due times
    sequence_num: u64,
    payload: T,
}

// Reverse ordering for min-heap (earliest due time first)
impl<T> Ord for DelayedEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

impl<T> PartialOrd for DelayedEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for DelayedEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence_num == other.sequence_num
    }
}

impl<T> Eq for DelayedEntry<T> {}

/// Min-heap of payloads keyed by due time
pub struct DelayedTaskQueue<T> {
    heap: BinaryHeap<DelayedEntry<T>>,
    next_sequence_num: u64,
}

impl<T> DelayedTaskQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence_num: 0,
        }
    }

    /// Add a payload that becomes eligible at `due`
    pub fn push(&mut self, due: Instant, payload: T) {
        let sequence_num = self.next_sequence_num;
        self.next_sequence_num += 1;
        self.heap.push(DelayedEntry {
            due,
            sequence_num,
            payload,
        });
    }

    /// Due time of the earliest entry
    pub fn next_wake_time(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    /// Pop the earliest entry if it is due at `now`
    pub fn pop_ready(&mut self, now: Instant) -> Option<T> {
        match self.heap.peek() {
            Some(entry) if entry.due <= now => self.heap.pop().map(|entry| entry.payload),
            _ => None,
        }
    }

    /// Pop every entry due at `now`, earliest first
    pub fn take_ready(&mut self, now: Instant) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(payload) = self.pop_ready(now) {
            ready.push(payload);
        }
        ready
    }

    /// Remove every entry, in no particular order
    pub fn drain(&mut self) -> Vec<T> {
        self.heap.drain().map(|entry| entry.payload).collect()
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for DelayedTaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_queue() {
        let mut queue: DelayedTaskQueue<u32> = DelayedTaskQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.next_wake_time(), None);
        assert_eq!(queue.pop_ready(Instant::now()), None);
    }

    #[test]
    fn test_orders_by_due_time() {
        let now = Instant::now();
        let mut queue = DelayedTaskQueue::new();
        queue.push(now + Duration::from_millis(30), "c");
        queue.push(now + Duration::from_millis(10), "a");
        queue.push(now + Duration::from_millis(20), "b");

        assert_eq!(queue.next_wake_time(), Some(now + Duration::from_millis(10)));
        assert_eq!(queue.take_ready(now + Duration::from_millis(30)), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_equal_due_times_keep_fifo() {
        let due = Instant::now();
        let mut queue = DelayedTaskQueue::new();
        for i in 0..5 {
            queue.push(due, i);
        }
        assert_eq!(queue.take_ready(due), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_not_ready_before_due() {
        let now = Instant::now();
        let mut queue = DelayedTaskQueue::new();
        queue.push(now + Duration::from_millis(50), 1);

        assert_eq!(queue.pop_ready(now), None);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_ready(now + Duration::from_millis(50)), Some(1));
    }

    #[test]
    fn test_drain() {
        let now = Instant::now();
        let mut queue = DelayedTaskQueue::new();
        queue.push(now + Duration::from_secs(60), 1);
        queue.push(now, 2);
        let mut drained = queue.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert!(queue.is_empty());
    }
}
