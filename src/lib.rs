#![forbid(unsafe_code)]
#![warn(unreachable_pub)]

//! Thread emulation on top of a cooperative task scheduler.
//!
//! Code written against a classic thread model (create, start, poll whether it
//! finished, sleep the caller, set a priority) runs here without any native
//! thread-start or thread-state API. Each "thread" is a label over a task on a
//! shared scheduler; its state is derived from the task status on demand.
//!
//! # Quick Start
//!
//! ```no_run
//! use thread_shim::{Thread, ThreadState, WaitCallback, WorkItemQueue};
//!
//! let worker = Thread::new(|| {
//!     // background work
//! });
//! assert_eq!(worker.state(), ThreadState::Unstarted);
//! worker.start();
//!
//! while worker.state() != ThreadState::Stopped {
//!     Thread::sleep(10);
//! }
//!
//! let log_line = WaitCallback::new(|line: String| println!("{}", line));
//! WorkItemQueue::new().submit(&log_line, "fire and forget".to_string());
//! ```
//!
//! # Architecture
//!
//! - [`sched`]: the [`Scheduler`] seam, a worker pool, an inline scheduler
//!   and the [`Task`] status vocabulary
//! - [`time`]: the delay timer behind [`Thread::sleep`]
//! - [`thread`]: [`Thread`] handles and the derived [`ThreadState`]
//! - [`work_queue`]: fire-and-forget [`WorkItemQueue`]
//! - [`bootstrap`]: the application entry contract

pub mod bootstrap;
pub mod errors;
pub mod sched;
pub mod thread;
pub mod time;
pub mod work_queue;

#[cfg(test)]
mod tests;

// ============================================================================
// Public API
// ============================================================================

// Scheduler
pub use sched::{InlineScheduler, PoolBuilder, PoolStats, Scheduler, Task, TaskStatus, WorkerPool};

// Threads
pub use thread::{Thread, ThreadId, ThreadPriority, ThreadState};

// Work items
pub use work_queue::{queue_user_work_item, WaitCallback, WorkItem, WorkItemQueue};

// Errors
pub use errors::{ThreadError, ThreadResult};

/// Block the calling thread for about `milliseconds`.
///
/// Same as [`Thread::sleep`].
#[inline]
pub fn sleep(milliseconds: u64) {
    Thread::sleep(milliseconds);
}
