//! Tasks and their traits

#[allow(clippy::module_inception)]
mod task;
mod traits;

pub(crate) use task::deadline_after;
pub use task::{OnceClosure, Task, TaskId, TaskMetadata};
pub use traits::{TaskPriority, TaskShutdownBehavior, TaskTraits, TaskTraitsBuilder};
