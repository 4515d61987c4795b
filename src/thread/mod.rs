//! Thread emulation over scheduler tasks.
//!
//! A "thread" here is only a label over a task: there is no dedicated OS
//! thread behind a [`Thread`], and its state is recomputed from the tracked
//! task's status on every query.

use core::num::NonZeroU64;
use portable_atomic::{AtomicU64, Ordering};

use crate::sched::TaskStatus;

pub mod handle;

pub use handle::Thread;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    fn next() -> Self {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Get the ID as u64.
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

/// Coarse lifecycle of a [`Thread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadState {
    Running = 0,
    Unstarted = 1,
    Stopped = 2,
}

impl ThreadState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ThreadState::Running,
            2 => ThreadState::Stopped,
            _ => ThreadState::Unstarted,
        }
    }
}

/// Advisory scheduling hint. Stored on the thread, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ThreadPriority {
    BelowNormal = 1,
}

impl ThreadPriority {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ThreadPriority::BelowNormal),
            _ => None,
        }
    }
}

/// Map a task status snapshot to a thread state.
///
/// `None` means no task is tracked. Success and fault both read as
/// `Stopped`; callers cannot tell them apart.
pub fn derive_state(status: Option<TaskStatus>) -> ThreadState {
    match status {
        Some(TaskStatus::Running | TaskStatus::WaitingForChildren) => ThreadState::Running,
        Some(TaskStatus::RanToCompletion | TaskStatus::Faulted) => ThreadState::Stopped,
        // TODO: a cancelled task reads as never started. Kept as observed
        // until it is settled whether this should be `Stopped`.
        Some(TaskStatus::Canceled) => ThreadState::Unstarted,
        Some(TaskStatus::Created | TaskStatus::WaitingToRun) | None => ThreadState::Unstarted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_state_table() {
        let table = [
            (None, ThreadState::Unstarted),
            (Some(TaskStatus::Created), ThreadState::Unstarted),
            (Some(TaskStatus::WaitingToRun), ThreadState::Unstarted),
            (Some(TaskStatus::Running), ThreadState::Running),
            (Some(TaskStatus::WaitingForChildren), ThreadState::Running),
            (Some(TaskStatus::RanToCompletion), ThreadState::Stopped),
            (Some(TaskStatus::Faulted), ThreadState::Stopped),
            (Some(TaskStatus::Canceled), ThreadState::Unstarted),
        ];
        for (status, expected) in table {
            assert_eq!(derive_state(status), expected, "status {:?}", status);
        }
    }

    #[test]
    fn test_state_byte_encoding() {
        for state in [ThreadState::Running, ThreadState::Unstarted, ThreadState::Stopped] {
            assert_eq!(ThreadState::from_u8(state as u8), state);
        }
        assert_eq!(ThreadPriority::from_u8(0), None);
        assert_eq!(
            ThreadPriority::from_u8(ThreadPriority::BelowNormal as u8),
            Some(ThreadPriority::BelowNormal)
        );
    }

    #[test]
    fn test_thread_ids_increase() {
        let a = ThreadId::next();
        let b = ThreadId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), a.as_u64().to_string());
    }
}
