//! A single deferred unit of work

use crate::location::Location;
use crate::task::TaskTraits;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Work posted to a task runner. Runs at most once.
pub type OnceClosure = Box<dyn FnOnce() + Send + 'static>;

/// Unique, monotonically increasing task identifier
///
/// Also serves as the posting sequence number, so comparing two ids tells
/// which task was posted first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Delays longer than this are clamped so the deadline fits in an `Instant`
const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline `delay` after `start`, clamped to the latest representable
/// instant rather than overflowing
pub(crate) fn deadline_after(start: Instant, delay: Duration) -> Instant {
    let mut delay = delay.min(MAX_DELAY);
    loop {
        if let Some(deadline) = start.checked_add(delay) {
            return deadline;
        }
        delay /= 2;
    }
}

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything known about a task except its closure
///
/// This is what task observers see.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    id: TaskId,
    posted_from: Location,
    traits: TaskTraits,
    queue_time: Instant,
    delayed_run_time: Option<Instant>,
}

impl TaskMetadata {
    /// Task identifier
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Where the task was posted from
    pub fn posted_from(&self) -> &Location {
        &self.posted_from
    }

    /// Traits applied to the task
    pub fn traits(&self) -> &TaskTraits {
        &self.traits
    }

    /// When the task was posted
    pub fn queue_time(&self) -> Instant {
        self.queue_time
    }

    /// Earliest time the task may run, for delayed tasks
    pub fn delayed_run_time(&self) -> Option<Instant> {
        self.delayed_run_time
    }
}

/// A closure plus its metadata
pub struct Task {
    metadata: TaskMetadata,
    closure: OnceClosure,
}

impl Task {
    /// Create a task. A zero `delay` means the task is immediately eligible.
    pub fn new(
        posted_from: Location,
        traits: TaskTraits,
        closure: OnceClosure,
        delay: Duration,
    ) -> Self {
        let queue_time = Instant::now();
        let (traits, delayed_run_time) = if delay.is_zero() {
            (traits, None)
        } else {
            (traits.for_delayed_task(), Some(deadline_after(queue_time, delay)))
        };

        Self {
            metadata: TaskMetadata {
                id: TaskId::new(),
                posted_from,
                traits,
                queue_time,
                delayed_run_time,
            },
            closure,
        }
    }

    /// Task metadata
    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    /// Task identifier
    pub fn id(&self) -> TaskId {
        self.metadata.id
    }

    /// Traits applied to the task
    pub fn traits(&self) -> &TaskTraits {
        &self.metadata.traits
    }

    /// Where the task was posted from
    pub fn posted_from(&self) -> &Location {
        &self.metadata.posted_from
    }

    /// Earliest time the task may run, for delayed tasks
    pub fn delayed_run_time(&self) -> Option<Instant> {
        self.metadata.delayed_run_time
    }

    /// Run the closure, consuming the task
    pub fn run(self) {
        (self.closure)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.metadata.id)
            .field("posted_from", &self.metadata.posted_from)
            .field("traits", &self.metadata.traits)
            .field("delayed_run_time", &self.metadata.delayed_run_time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskShutdownBehavior;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_task_ids_increase() {
        let first = TaskId::new();
        let second = TaskId::new();
        assert!(second > first);
        assert!(first.as_u64() > 0);
    }

    #[test]
    fn test_task_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let task = Task::new(
            crate::from_here!(),
            TaskTraits::new(),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::ZERO,
        );

        assert!(task.delayed_run_time().is_none());
        task.run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delayed_task_metadata() {
        let traits = TaskTraits::from(TaskShutdownBehavior::BlockShutdown);
        let task = Task::new(
            crate::from_here!(),
            traits,
            Box::new(|| {}),
            Duration::from_millis(50),
        );

        let metadata = task.metadata();
        let due = metadata.delayed_run_time().expect("delayed task has a due time");
        assert_eq!(due - metadata.queue_time(), Duration::from_millis(50));
        assert_eq!(
            task.traits().shutdown_behavior(),
            TaskShutdownBehavior::SkipOnShutdown
        );
    }

    #[test]
    fn test_huge_delay_is_clamped() {
        let task = Task::new(
            crate::from_here!(),
            TaskTraits::new(),
            Box::new(|| {}),
            Duration::MAX,
        );

        let metadata = task.metadata();
        let due = metadata.delayed_run_time().expect("delayed task has a due time");
        assert_eq!(due - metadata.queue_time(), MAX_DELAY);
    }

    #[test]
    fn test_deadline_after_never_before_start() {
        let start = Instant::now();
        assert_eq!(deadline_after(start, Duration::ZERO), start);
        assert!(deadline_after(start, Duration::MAX) > start);
        assert_eq!(
            deadline_after(start, Duration::from_secs(1)),
            start + Duration::from_secs(1)
        );
    }

    #[test]
    fn test_dropping_task_drops_captures() {
        let captured = Arc::new(());
        let c = captured.clone();
        let task = Task::new(
            crate::from_here!(),
            TaskTraits::new(),
            Box::new(move || drop(c)),
            Duration::ZERO,
        );

        assert_eq!(Arc::strong_count(&captured), 2);
        drop(task);
        assert_eq!(Arc::strong_count(&captured), 1);
    }
}
