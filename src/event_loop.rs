//! Cooperative single-threaded event loop (C7, §4.4): a microtask queue and
//! a macrotask queue, drained in strict order — all pending microtasks
//! before the next macrotask, every time.
//!
//! Grounded loosely on the teacher's `profiler.rs::CallTracker`, the closest
//! precedent in the pack for a `Mutex`-guarded queue pushed/popped from
//! ordinary (non-async) code; there is no direct event-loop precedent in
//! the teacher or example repos, so the queue discipline here follows only
//! the ordering rules spelled out in §4.4 and §8.

use crate::config::RuntimeConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A scheduled unit of work. Boxed so the loop can hold a heterogeneous
/// queue of closures without generics leaking into its public API.
pub type Task = Box<dyn FnOnce() + Send>;

pub struct EventLoop {
    microtasks: Mutex<VecDeque<Task>>,
    macrotasks: Mutex<VecDeque<Task>>,
    stopped: AtomicBool,
    drain_limit: usize,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::with_drain_limit(RuntimeConfig::default().microtask_drain_limit)
    }

    /// Builds a loop whose microtask drain bails out after `drain_limit`
    /// tasks in a single pass, guarding against a microtask that keeps
    /// requeueing itself and starves the macrotask queue (§10.3).
    pub fn with_drain_limit(drain_limit: usize) -> Self {
        EventLoop {
            microtasks: Mutex::new(VecDeque::new()),
            macrotasks: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
            drain_limit,
        }
    }

    /// Enqueues a microtask. Microtasks scheduled while draining the
    /// microtask queue are picked up in the same drain, before the next
    /// macrotask runs (§4.4).
    pub fn queue_microtask(&self, task: Task) {
        self.microtasks.lock().push_back(task);
    }

    /// Enqueues a macrotask (e.g. a timer callback).
    pub fn queue_task(&self, task: Task) {
        self.macrotasks.lock().push_back(task);
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.lock().len()
    }

    pub fn pending_macrotasks(&self) -> usize {
        self.macrotasks.lock().len()
    }

    /// Stops the loop after the task currently running (if any) returns.
    /// Queued tasks are left intact; `stopped()` can be inspected and the
    /// loop resumed later by calling `run` again.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn drain_microtasks(&self) {
        let mut drained = 0usize;
        loop {
            if drained >= self.drain_limit {
                tracing::warn!(limit = self.drain_limit, "microtask drain limit reached; leaving remaining microtasks queued");
                break;
            }
            let next = self.microtasks.lock().pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
            drained += 1;
            if self.stopped() {
                break;
            }
        }
    }

    /// Runs until both queues are empty or `stop()` is called: drains every
    /// pending microtask, then runs exactly one macrotask, then repeats.
    pub fn run(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        loop {
            self.drain_microtasks();
            if self.stopped() {
                return;
            }
            let next = self.macrotasks.lock().pop_front();
            match next {
                Some(task) => task(),
                None => {
                    // One last microtask drain in case the final macrotask
                    // queued more before the queues were found empty.
                    self.drain_microtasks();
                    return;
                }
            }
        }
    }
}
