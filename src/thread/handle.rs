use std::sync::{Arc, Weak};
use std::time::Duration;

use log::trace;
use portable_atomic::{AtomicU8, Ordering};

use super::{derive_state, ThreadId, ThreadPriority, ThreadState};
use crate::sched::{self, Scheduler, Task};

/// Slot shared between a thread and the continuation of its task.
struct Tracker {
    current: spin::Mutex<Option<Task>>,
    /// State reported once the tracked task has been cleared.
    settled: AtomicU8,
}

impl Tracker {
    fn new() -> Self {
        Self {
            current: spin::Mutex::new(None),
            settled: AtomicU8::new(ThreadState::Unstarted as u8),
        }
    }

    /// Drop the reference to `finished` unless a later start replaced it.
    fn settle(&self, finished: &Task) {
        let mut current = self.current.lock();
        if current.as_ref().map_or(false, |task| task.ptr_eq(finished)) {
            let state = derive_state(Some(finished.status()));
            self.settled.store(state as u8, Ordering::Release);
            *current = None;
        }
    }

    fn state(&self) -> ThreadState {
        let current = self.current.lock();
        match current.as_ref() {
            Some(task) => derive_state(Some(task.status())),
            None => ThreadState::from_u8(self.settled.load(Ordering::Acquire)),
        }
    }
}

/// A unit of deferred work that looks like a thread.
///
/// `start` hands the work to the scheduler; `state` reports
/// Unstarted, Running or Stopped.
///
/// Call `start` at most once, and never again before the previous run has
/// been observed as `Stopped`. A second call is not rejected: it schedules
/// another concurrent run of the same work and the handle tracks only the
/// newest one.
pub struct Thread {
    id: ThreadId,
    work: Arc<dyn Fn() + Send + Sync + 'static>,
    priority: AtomicU8,
    tracker: Arc<Tracker>,
    scheduler: Arc<dyn Scheduler>,
}

impl Thread {
    /// Create an unstarted thread on the global scheduler.
    pub fn new<F>(work: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_scheduler(work, sched::global())
    }

    /// Create an unstarted thread on a specific scheduler.
    pub fn with_scheduler<F>(work: F, scheduler: Arc<dyn Scheduler>) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: ThreadId::next(),
            work: Arc::new(work),
            priority: AtomicU8::new(0),
            tracker: Arc::new(Tracker::new()),
            scheduler,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The stored hint, if one was set.
    pub fn priority(&self) -> Option<ThreadPriority> {
        ThreadPriority::from_u8(self.priority.load(Ordering::Acquire))
    }

    /// Store an advisory hint. The scheduler never reads it.
    pub fn set_priority(&self, priority: ThreadPriority) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    /// Schedule the work and return immediately.
    ///
    /// A panic inside the work is absorbed by the scheduler and shows up
    /// only as `Stopped`.
    pub fn start(&self) {
        let work = Arc::clone(&self.work);
        let task = Task::new(move || work());
        *self.tracker.current.lock() = Some(task.clone());

        let tracker: Weak<Tracker> = Arc::downgrade(&self.tracker);
        task.continue_with(move |finished| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.settle(finished);
            }
        });

        trace!("thread {} starting as task {}", self.id, task.id());
        self.scheduler.schedule(task);
    }

    /// Current lifecycle state, derived from the tracked task.
    ///
    /// Never waits on the work. Right after the work finishes this may
    /// briefly still report the previous state.
    pub fn state(&self) -> ThreadState {
        self.tracker.state()
    }

    /// Whether the work is currently running.
    pub fn is_alive(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Block the calling thread for about `milliseconds`.
    ///
    /// Waits on a delay task from the global scheduler without spinning and
    /// without holding up other scheduled work.
    pub fn sleep(milliseconds: u64) {
        sched::global()
            .delay(Duration::from_millis(milliseconds))
            .wait();
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("priority", &self.priority())
            .finish()
    }
}
