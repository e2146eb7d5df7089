//! Batched dispatch: coalescing bursts of actions into one flush
//!
//! Many actions dispatched within one scheduling tick should cost one
//! commit/notify cycle, not one per action. The first dispatch since the
//! last flush schedules exactly one flush through a pluggable [`Scheduler`];
//! every later dispatch only appends to the pending queue. The scheduler is
//! a capability so batching stays deterministic under test — no reliance on
//! a host environment's timer facilities.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::action::Action;

/// Delay used by [`TimerScheduler::default`]: the short fixed fallback used
/// when no refresh-aligned callback source exists.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(4);

/// Scheduling primitive for batch flushes. Called at most once per pending
/// batch; the callback drains the queue.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, flush: Box<dyn FnOnce() + Send>);
}

/// Fires the flush on a timer thread after a short fixed delay.
pub struct TimerScheduler {
    delay: Duration,
}

impl TimerScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_DELAY)
    }
}

impl Scheduler for TimerScheduler {
    fn schedule(&self, flush: Box<dyn FnOnce() + Send>) {
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            flush();
        });
    }
}

/// Collects flush callbacks for explicit draining. Makes batching fully
/// deterministic in tests: dispatch, then `run_pending`.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every scheduled flush, including flushes scheduled while running.
    /// Returns how many callbacks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch: Vec<_> = {
                let mut pending = self.pending.lock().unwrap();
                pending.drain(..).collect()
            };
            if batch.is_empty() {
                return ran;
            }
            for flush in batch {
                flush();
                ran += 1;
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, flush: Box<dyn FnOnce() + Send>) {
        self.pending.lock().unwrap().push(flush);
    }
}

/// Pending plain actions plus the "one flush in flight" flag. Guarded by a
/// single mutex in the store so append-vs-flush stays atomic.
#[derive(Default)]
pub(crate) struct BatchQueue {
    actions: VecDeque<Action>,
    scheduled: bool,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; returns `true` when the caller must schedule a
    /// flush (first action since the last flush).
    pub fn push(&mut self, action: Action) -> bool {
        self.actions.push_back(action);
        if self.scheduled {
            false
        } else {
            self.scheduled = true;
            true
        }
    }

    /// Swap out the whole queue and clear the scheduled flag, so a dispatch
    /// issued during the flush re-arms scheduling through the normal path.
    pub fn take(&mut self) -> VecDeque<Action> {
        self.scheduled = false;
        std::mem::take(&mut self.actions)
    }
}
