//! Single-thread loop driver
//!
//! - [`SequenceManager`]: binds a loop to the current thread
//! - [`RunLoop`]: one (possibly nested) run level
//! - [`LoopTaskRunner`]: posts to the loop from any thread
//! - [`MessagePump`]: how the loop sleeps and is woken

mod manager;
mod observer;
mod pump;
mod run_loop;
mod runner;

pub use manager::{LoopDriver, LoopState, SequenceManager};
pub use observer::TaskObserver;
pub use pump::{DefaultPump, MessagePump};
pub use run_loop::{QuitHandle, RunKind, RunLoop, ScopedNestableTaskAllower};
pub use runner::LoopTaskRunner;
