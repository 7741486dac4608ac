//! Worker pool
//!
//! Tasks posted to the pool go into sequences. Sequences that have work wait
//! in a priority ready queue until a worker of the [`ThreadGroup`] takes them,
//! runs one task, and hands them back.
//!
//! [`ThreadGroup`]: thread_group::ThreadGroup

mod blocking;
mod delayed_service;
mod pool;
mod pooled_runner;
mod priority_queue;
mod registry;
mod single_thread;
mod task_tracker;
mod thread_group;
mod worker;

pub use blocking::{BlockingType, ScopedBlockingCall};
pub use delayed_service::DelayedTaskService;
pub use pool::ThreadPool;
pub use pooled_runner::{PooledParallelTaskRunner, PooledSequencedTaskRunner};
pub use registry::SequenceRegistry;
pub use single_thread::PooledSingleThreadTaskRunner;
pub use task_tracker::TaskTracker;
pub use thread_group::ThreadGroupStats;
