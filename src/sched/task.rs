//! Units of work with an observable status.
//!
//! A [`Task`] wraps a one-shot body. Schedulers move it from `Created` to
//! `WaitingToRun`, a worker runs it, and it ends in exactly one terminal
//! status. Continuations and waiters are released once that terminal status
//! is visible.

use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroU64;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use portable_atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use super::{lock, pool};
use crate::errors::{ThreadError, ThreadResult};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_TASK: RefCell<Option<Task>> = const { RefCell::new(None) };
}

/// Unique identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    fn next() -> Self {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Get the ID as u64.
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task as seen by its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskStatus {
    /// Constructed, not yet handed to a scheduler.
    Created = 0,
    /// Queued on a scheduler.
    WaitingToRun = 1,
    /// Body is executing.
    Running = 2,
    /// Body returned, attached children are still outstanding.
    WaitingForChildren = 3,
    /// Body and children finished without panicking.
    RanToCompletion = 4,
    /// Body or an attached child panicked.
    Faulted = 5,
    /// Cancelled before the body started.
    Canceled = 6,
}

impl TaskStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Created,
            1 => TaskStatus::WaitingToRun,
            2 => TaskStatus::Running,
            3 => TaskStatus::WaitingForChildren,
            4 => TaskStatus::RanToCompletion,
            5 => TaskStatus::Faulted,
            6 => TaskStatus::Canceled,
            _ => TaskStatus::Created,
        }
    }

    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::RanToCompletion | TaskStatus::Faulted | TaskStatus::Canceled
        )
    }
}

type Body = Box<dyn FnOnce() + Send + 'static>;
type Continuation = Box<dyn FnOnce(&Task) + Send + 'static>;

enum Continuations {
    Pending(Vec<Continuation>),
    Fired,
}

struct TaskInner {
    id: TaskId,
    status: AtomicU8,
    body: spin::Mutex<Option<Body>>,
    continuations: spin::Mutex<Continuations>,
    /// One for the body plus one per attached child still running.
    /// Zero once the task has been finalized.
    pending: AtomicUsize,
    faulted: AtomicBool,
    done: Mutex<bool>,
    done_signal: Condvar,
}

/// Shared handle to a unit of work.
///
/// Cloning is cheap; all clones observe the same status.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Create a task in the `Created` status.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_body(Some(Box::new(body)))
    }

    fn with_body(body: Option<Body>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::next(),
                status: AtomicU8::new(TaskStatus::Created as u8),
                body: spin::Mutex::new(body),
                continuations: spin::Mutex::new(Continuations::Pending(Vec::new())),
                pending: AtomicUsize::new(1),
                faulted: AtomicBool::new(false),
                done: Mutex::new(false),
                done_signal: Condvar::new(),
            }),
        }
    }

    /// Create a task that has already run to completion.
    pub fn completed() -> Self {
        let task = Self::with_body(None);
        task.inner.pending.store(0, Ordering::Release);
        task.inner
            .status
            .store(TaskStatus::RanToCompletion as u8, Ordering::Release);
        task.fire();
        task
    }

    /// The task whose body is executing on the calling thread, if any.
    pub fn current() -> Option<Task> {
        CURRENT_TASK.with(|current| current.borrow().clone())
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// Whether the task reached a terminal status.
    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    /// Whether both handles refer to the same task.
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Move from `Created` to `WaitingToRun`.
    ///
    /// Returns `false` if the task was already handed to a scheduler.
    pub(crate) fn mark_scheduled(&self) -> bool {
        self.transition(TaskStatus::Created, TaskStatus::WaitingToRun)
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.inner
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Execute the body on the calling thread.
    ///
    /// Does nothing unless the task is `WaitingToRun`. A panicking body is
    /// recorded as `Faulted`; the payload is dropped.
    pub(crate) fn run(&self) {
        if !self.transition(TaskStatus::WaitingToRun, TaskStatus::Running) {
            return;
        }

        let body = self.inner.body.lock().take();
        let previous = CURRENT_TASK.with(|current| current.replace(Some(self.clone())));
        let outcome = body.map(|body| panic::catch_unwind(AssertUnwindSafe(body)));
        CURRENT_TASK.with(|current| *current.borrow_mut() = previous);

        if let Some(Err(_payload)) = outcome {
            self.inner.faulted.store(true, Ordering::Release);
        }

        if self.inner.pending.load(Ordering::Acquire) > 1 {
            self.inner
                .status
                .store(TaskStatus::WaitingForChildren as u8, Ordering::Release);
        }
        self.release_pending();
    }

    fn release_pending(&self) {
        let mut pending = self.inner.pending.load(Ordering::Acquire);
        loop {
            // Already finalized, or cancelled while a child was attaching.
            if pending == 0 {
                return;
            }
            match self.inner.pending.compare_exchange_weak(
                pending,
                pending - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => pending = actual,
            }
        }
        if pending != 1 {
            return;
        }
        let terminal = if self.inner.faulted.load(Ordering::Acquire) {
            TaskStatus::Faulted
        } else {
            TaskStatus::RanToCompletion
        };
        self.inner.status.store(terminal as u8, Ordering::Release);
        self.fire();
    }

    /// Cancel a task whose body has not started.
    ///
    /// Returns whether the cancellation took effect. Running or finished
    /// tasks are left alone.
    pub fn cancel(&self) -> bool {
        for from in [TaskStatus::Created, TaskStatus::WaitingToRun] {
            if self.transition(from, TaskStatus::Canceled) {
                self.inner.pending.store(0, Ordering::Release);
                drop(self.inner.body.lock().take());
                self.fire();
                return true;
            }
        }
        false
    }

    /// Run continuations, then wake waiters.
    fn fire(&self) {
        let continuations =
            core::mem::replace(&mut *self.inner.continuations.lock(), Continuations::Fired);
        if let Continuations::Pending(continuations) = continuations {
            for continuation in continuations {
                self.run_continuation(continuation);
            }
        }

        *lock(&self.inner.done) = true;
        self.inner.done_signal.notify_all();
    }

    fn run_continuation(&self, continuation: Continuation) {
        let _ = panic::catch_unwind(AssertUnwindSafe(|| continuation(self)));
    }

    /// Attach a continuation that runs once the task is terminal.
    ///
    /// The continuation runs on the thread that completes the task, or right
    /// away on the caller if the task is already terminal.
    pub fn continue_with<F>(&self, continuation: F)
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        let mut slot = self.inner.continuations.lock();
        if let Continuations::Pending(list) = &mut *slot {
            list.push(Box::new(continuation));
            return;
        }
        drop(slot);
        self.run_continuation(Box::new(continuation));
    }

    /// Keep this task from completing until `child` is terminal.
    ///
    /// A faulted child faults the parent. A parent that is already terminal,
    /// cancelled included, rejects the child with `WrongState`.
    pub fn attach_child(&self, child: &Task) -> ThreadResult<()> {
        let mut pending = self.inner.pending.load(Ordering::Acquire);
        loop {
            if pending == 0 {
                return Err(ThreadError::wrong_state());
            }
            match self.inner.pending.compare_exchange_weak(
                pending,
                pending + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => pending = actual,
            }
        }

        let parent = self.clone();
        child.continue_with(move |child| {
            if child.status() == TaskStatus::Faulted {
                parent.inner.faulted.store(true, Ordering::Release);
            }
            parent.release_pending();
        });
        Ok(())
    }

    /// Block the calling thread until the task is terminal.
    ///
    /// On a pool worker the pool starts a replacement worker for the
    /// duration of the wait, so waiting never starves other queued work.
    pub fn wait(&self) {
        if self.is_done() {
            return;
        }
        pool::blocking(|| {
            let mut done = lock(&self.inner.done);
            while !*done {
                done = self
                    .inner
                    .done_signal
                    .wait(done)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        })
    }

    /// Block for at most `timeout`. Returns whether the task is terminal.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_done() || timeout.is_zero() {
            return self.is_done();
        }
        pool::blocking(|| {
            let done = lock(&self.inner.done);
            let (done, _) = self
                .inner
                .done_signal
                .wait_timeout_while(done, timeout, |done| !*done)
                .unwrap_or_else(PoisonError::into_inner);
            *done
        })
    }

    fn is_done(&self) -> bool {
        *lock(&self.inner.done)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}
