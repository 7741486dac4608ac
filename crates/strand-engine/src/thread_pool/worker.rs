//! Worker thread main loop
//!
//! A worker takes one ready sequence at a time, runs a single task from it
//! and hands the sequence back to the group, which re-enqueues it if work
//! remains.

use crate::sequence::{ScopedSequenceContext, Sequence};
use crate::task::Task;
use crate::thread_pool::blocking::{TaskBlockingScope, WorkerContextGuard};
use crate::thread_pool::thread_group::ThreadGroup;
use std::sync::Arc;
use std::thread;

/// Body of a worker thread
pub(crate) fn run(group: Arc<ThreadGroup>, id: usize) {
    let name = thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("worker-{}", id));
    group.thread_names().set_name_for_current_thread(&name);
    let _context = WorkerContextGuard::enter(Arc::downgrade(&group));

    tracing::trace!(worker = id, "Worker started");

    while let Some(sequence) = group.get_work(id) {
        if !sequence.try_claim() {
            crate::contract_violation!(
                worker = id,
                sequence = sequence.id().as_u64(),
                "Ready sequence already claimed"
            );
        }

        if let Some(task) = sequence.take_task() {
            run_task(&group, &sequence, task);
        }

        let outcome = sequence.did_run_task();
        group.did_process_sequence(sequence, outcome);
    }

    group.thread_names().remove_current_thread();
    tracing::trace!(worker = id, "Worker exiting");
}

fn run_task(group: &ThreadGroup, sequence: &Sequence, task: Task) {
    let tracker = group.tracker();
    let traits = *task.traits();

    if !tracker.before_run_task(&traits) {
        tracing::trace!(task = task.id().as_u64(), "Skipping task during shutdown");
        drop(task);
        tracker.did_discard_task(&traits);
        return;
    }

    tracing::trace!(
        task = task.id().as_u64(),
        sequence = sequence.id().as_u64(),
        posted_from = %task.posted_from(),
        "Running task"
    );
    {
        let _sequence = ScopedSequenceContext::enter(sequence.id());
        let _blocking = TaskBlockingScope::enter(traits.may_block());
        task.run();
    }
    tracker.after_run_task(&traits);
}
