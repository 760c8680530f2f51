//! Idle strategies for agent loops and response waits.

use std::time::Duration;

/// How a loop behaves when it has no work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStrategy {
    /// Park the thread for a fixed interval, in nanoseconds.
    Sleep(u64),
    /// Yield to the scheduler.
    Yield,
    /// Spin with a CPU relax hint.
    Busy,
}

impl IdleStrategy {
    /// Perform one idle tick.
    pub fn idle(&self) {
        match *self {
            IdleStrategy::Sleep(nanos) => std::thread::sleep(Duration::from_nanos(nanos)),
            IdleStrategy::Yield => std::thread::yield_now(),
            IdleStrategy::Busy => std::hint::spin_loop(),
        }
    }

    /// Idle only when the previous cycle produced no work.
    pub fn idle_for(&self, work_count: usize) {
        if work_count == 0 {
            self.idle();
        }
    }
}

impl Default for IdleStrategy {
    fn default() -> Self {
        IdleStrategy::Sleep(crate::context::DEFAULT_IDLE_SLEEP_NS)
    }
}
