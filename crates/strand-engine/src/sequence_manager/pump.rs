//! Message pumps
//!
//! The loop driver only needs two things from the platform: a way to sleep
//! until there is work or a timer fires, and a way to be woken from another
//! thread. [`DefaultPump`] provides both with a condvar.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Wakes and blocks the loop thread
pub trait MessagePump: Send + Sync {
    /// Block the calling (loop) thread until `deadline`, or until
    /// [`schedule_work`](MessagePump::schedule_work) is called. `None` waits
    /// without a deadline.
    fn wait_until(&self, deadline: Option<Instant>);

    /// Wake the loop thread. Safe to call from any thread.
    fn schedule_work(&self);

    /// Make sure the loop thread wakes no later than `at`
    fn schedule_delayed_work(&self, at: Instant);
}

#[derive(Debug, Default)]
struct PumpState {
    /// A wake-up is pending
    work_scheduled: bool,
    /// Earliest delayed wake-up requested since the last wait
    delayed_work_time: Option<Instant>,
}

/// Condvar-backed pump
#[derive(Debug, Default)]
pub struct DefaultPump {
    state: Mutex<PumpState>,
    cond: Condvar,
}

impl DefaultPump {
    /// Create a pump with no pending wake-up
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessagePump for DefaultPump {
    fn wait_until(&self, deadline: Option<Instant>) {
        let mut state = self.state.lock();
        loop {
            if state.work_scheduled {
                state.work_scheduled = false;
                break;
            }

            let deadline = match (deadline, state.delayed_work_time) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline
                        || self.cond.wait_until(&mut state, deadline).timed_out()
                    {
                        break;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
        state.delayed_work_time = None;
    }

    fn schedule_work(&self) {
        let mut state = self.state.lock();
        state.work_scheduled = true;
        self.cond.notify_one();
    }

    fn schedule_delayed_work(&self, at: Instant) {
        let mut state = self.state.lock();
        let earlier = state.delayed_work_time.map_or(true, |current| at < current);
        if earlier {
            state.delayed_work_time = Some(at);
            self.cond.notify_one();
        }
    }
}
