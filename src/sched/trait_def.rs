//! Scheduler trait definition.

use super::task::Task;
use std::time::Duration;

/// Counters reported by a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads owned by the scheduler.
    pub workers: usize,
    /// Workers parked in a blocking wait.
    pub blocked: usize,
    /// Tasks waiting in the run queue.
    pub queued: usize,
    /// Tasks whose body is currently executing.
    pub active: usize,
    /// Tasks run to a terminal status since the scheduler started.
    pub completed: u64,
}

/// Cooperative task scheduler.
///
/// This is the seam the thread and work-queue facades sit on. Implementations
/// multiplex many tasks onto execution contexts they own; they never dedicate
/// a context to a single task.
pub trait Scheduler: Send + Sync {
    /// Queue a task for execution.
    ///
    /// The task must be in the `Created` status; anything else is ignored.
    /// A scheduler that can no longer run work cancels the task instead.
    /// Never blocks on the task itself.
    fn schedule(&self, task: Task);

    /// Create a task that completes once `duration` has elapsed.
    ///
    /// The returned task is meant to be waited on; the wait blocks only the
    /// waiting thread, not other scheduled work.
    fn delay(&self, duration: Duration) -> Task;

    /// Get scheduler statistics.
    fn stats(&self) -> PoolStats {
        PoolStats::default()
    }
}

impl dyn Scheduler {
    /// Wrap `body` in a task and schedule it.
    pub fn spawn<F>(&self, body: F) -> Task
    where
        F: FnOnce() + Send + 'static,
    {
        let task = Task::new(body);
        self.schedule(task.clone());
        task
    }
}
