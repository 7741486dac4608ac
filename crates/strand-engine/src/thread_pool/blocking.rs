//! Blocking call annotations
//!
//! A pool task that is about to block wraps the blocking region in a
//! [`ScopedBlockingCall`]. While the guard lives the pool may run one more
//! task concurrently so that a blocked worker does not starve the others.

use crate::location::Location;
use crate::thread_pool::thread_group::{BlockingToken, ThreadGroup};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Weak;

/// How likely the annotated region is to block
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockingType {
    /// Might block, e.g. a read that is usually served from cache
    MayBlock,
    /// Will block, e.g. waiting on another thread. Compensated immediately
    /// under every policy.
    WillBlock,
}

struct WorkerContext {
    group: Weak<ThreadGroup>,
    /// The running task declared may-block
    may_block: bool,
    /// A blocking call is already registered on this thread
    in_blocking_call: bool,
}

thread_local! {
    static WORKER_CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Marks the current thread as a worker of `group` for its lifetime
pub(crate) struct WorkerContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl WorkerContextGuard {
    pub(crate) fn enter(group: Weak<ThreadGroup>) -> Self {
        WORKER_CONTEXT.with(|context| {
            *context.borrow_mut() = Some(WorkerContext {
                group,
                may_block: false,
                in_blocking_call: false,
            });
        });
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for WorkerContextGuard {
    fn drop(&mut self) {
        WORKER_CONTEXT.with(|context| context.borrow_mut().take());
    }
}

/// Records whether the task running on this worker may block
pub(crate) struct TaskBlockingScope {
    _not_send: PhantomData<*const ()>,
}

impl TaskBlockingScope {
    pub(crate) fn enter(may_block: bool) -> Self {
        WORKER_CONTEXT.with(|context| {
            if let Some(context) = context.borrow_mut().as_mut() {
                context.may_block = may_block;
            }
        });
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for TaskBlockingScope {
    fn drop(&mut self) {
        WORKER_CONTEXT.with(|context| {
            if let Some(context) = context.borrow_mut().as_mut() {
                context.may_block = false;
            }
        });
    }
}

fn leave_blocking_call() {
    WORKER_CONTEXT.with(|context| {
        if let Some(context) = context.borrow_mut().as_mut() {
            context.in_blocking_call = false;
        }
    });
}

/// Annotates a region of a task that may block
///
/// Off the pool this is a no-op. On a pool worker the running task must have
/// been posted with [`may_block`](crate::TaskTraitsBuilder::may_block);
/// anything else is a contract violation. Nested calls only count once.
pub struct ScopedBlockingCall {
    registration: Option<(Weak<ThreadGroup>, BlockingToken)>,
    _not_send: PhantomData<*const ()>,
}

impl ScopedBlockingCall {
    /// Enter a blocking region
    pub fn new(from_here: Location, blocking_type: BlockingType) -> Self {
        let group = WORKER_CONTEXT.with(|context| {
            let mut context = context.borrow_mut();
            let context = context.as_mut()?;
            if !context.may_block {
                crate::contract_violation!(
                    location = %from_here,
                    "Blocking call from a task posted without may_block"
                );
            }
            if context.in_blocking_call {
                return None;
            }
            context.in_blocking_call = true;
            Some(context.group.clone())
        });

        let registration = match group.map(|weak| (weak.upgrade(), weak)) {
            Some((Some(group), weak)) => {
                tracing::trace!(location = %from_here, ?blocking_type, "Entering blocking call");
                let token = group.blocking_started(blocking_type);
                Some((weak, token))
            }
            Some((None, _)) => {
                leave_blocking_call();
                None
            }
            None => None,
        };

        Self {
            registration,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopedBlockingCall {
    fn drop(&mut self) {
        let Some((weak, token)) = self.registration.take() else {
            return;
        };
        leave_blocking_call();
        if let Some(group) = weak.upgrade() {
            group.blocking_ended(token);
        }
    }
}
