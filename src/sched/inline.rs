//! Scheduler that runs work on the submitting thread.
//!
//! Used when no worker can be started, and in tests that need deterministic
//! ordering. `schedule` returns only after the task is terminal.

use std::time::Duration;

use log::warn;
use portable_atomic::{AtomicU64, Ordering};

use super::task::Task;
use super::trait_def::{PoolStats, Scheduler};

#[derive(Debug, Default)]
pub struct InlineScheduler {
    completed: AtomicU64,
}

impl InlineScheduler {
    pub const fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
        }
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, task: Task) {
        if !task.mark_scheduled() {
            warn!("task {} already handed to a scheduler, ignoring", task.id());
            return;
        }
        task.run();
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn delay(&self, duration: Duration) -> Task {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
        Task::completed()
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.completed.load(Ordering::Acquire),
            ..PoolStats::default()
        }
    }
}
