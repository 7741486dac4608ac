//! Strand Engine
//!
//! Sequenced task execution: work posted from any thread runs with ordering
//! and affinity guarantees, either on a pool of worker threads or on a single
//! bound thread.
//!
//! - **Tasks** (`task` module): closures plus traits (priority, shutdown
//!   behavior, may-block)
//! - **Sequences** (`sequence` module): FIFO queues that never run two of
//!   their tasks at once
//! - **Runners** (`runner` module): the parallel, sequenced and single-thread
//!   posting capabilities
//! - **Thread pool** (`thread_pool` module): elastic workers pulling ready
//!   sequences by priority, shutdown tracking, blocking-call compensation
//! - **Loop driver** (`sequence_manager` module): single-thread run loop with
//!   nesting, task observers and a pluggable message pump
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_engine::{from_here, TaskRunnerExt, TaskTraits, ThreadPool, ThreadPoolConfig};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::with_max_threads(4))?;
//! pool.start()?;
//!
//! let runner = pool.create_sequenced_task_runner(TaskTraits::new());
//! runner.post(from_here!(), || println!("first"));
//! runner.post(from_here!(), || println!("second"));
//!
//! pool.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[macro_use]
mod macros;

pub mod config;
pub mod delayed_queue;
pub mod error;
pub mod location;
pub mod runner;
pub mod sequence;
pub mod sequence_manager;
pub mod task;
pub mod thread_pool;
pub mod thread_registry;

pub use config::{Features, ThreadPoolConfig};
pub use delayed_queue::DelayedTaskQueue;
pub use error::{ConfigError, EngineError, EngineResult};
pub use location::Location;
pub use runner::{SequencedTaskRunner, SingleThreadTaskRunner, TaskRunner, TaskRunnerExt};
pub use sequence::{current_sequence_id, DidRunTask, Sequence, SequenceId, SequenceOwner};
pub use sequence_manager::{
    DefaultPump, LoopState, LoopTaskRunner, MessagePump, QuitHandle, RunKind, RunLoop,
    ScopedNestableTaskAllower, SequenceManager, TaskObserver,
};
pub use task::{
    OnceClosure, Task, TaskId, TaskMetadata, TaskPriority, TaskShutdownBehavior, TaskTraits,
    TaskTraitsBuilder,
};
pub use thread_pool::{
    BlockingType, PooledParallelTaskRunner, PooledSequencedTaskRunner,
    PooledSingleThreadTaskRunner, ScopedBlockingCall, ThreadPool,
};
pub use thread_registry::ThreadNameRegistry;

#[doc(hidden)]
pub use tracing as __tracing;
