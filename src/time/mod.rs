//! Delay timer backing `Scheduler::delay`.
//!
//! One thread owns a min-heap of deadlines and completes each delay task when
//! its deadline passes. Waiters block on the task, so nothing spins.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::debug;

use crate::errors::{SpawnError, ThreadResult};
use crate::sched::{lock, Task};

struct Entry {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct TimerState {
    pending: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    changed: Condvar,
}

/// Completes delay tasks at their deadlines.
pub struct DelayTimer {
    shared: Arc<TimerShared>,
    thread: spin::Mutex<Option<JoinHandle<()>>>,
}

impl DelayTimer {
    /// Start the timer thread under the given name.
    pub fn start(name: &str) -> ThreadResult<Self> {
        let shared = Arc::new(TimerShared::default());
        let handle = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(name.into())
                .spawn(move || timer_loop(shared))
                .map_err(SpawnError::from)?
        };
        Ok(Self {
            shared,
            thread: spin::Mutex::new(Some(handle)),
        })
    }

    /// A task that runs to completion no earlier than `duration` from now.
    ///
    /// Zero completes immediately. After shutdown the task comes back
    /// cancelled.
    pub fn delay(&self, duration: Duration) -> Task {
        if duration.is_zero() {
            return Task::completed();
        }

        let task = Task::new(|| {});
        task.mark_scheduled();
        let Some(deadline) = Instant::now().checked_add(duration) else {
            // Past the end of the clock: never elapses.
            return task;
        };

        let mut state = lock(&self.shared.state);
        if state.shutdown {
            drop(state);
            task.cancel();
            return task;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(Reverse(Entry {
            deadline,
            seq,
            task: task.clone(),
        }));
        drop(state);
        self.shared.changed.notify_one();
        task
    }

    /// Number of delays that have not elapsed yet.
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).pending.len()
    }

    /// Stop the timer thread, cancelling delays that have not elapsed.
    pub fn shutdown(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.changed.notify_all();

        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(shared: Arc<TimerShared>) {
    let mut state = lock(&shared.state);
    while !state.shutdown {
        let now = Instant::now();
        let next = state.pending.peek().map(|Reverse(entry)| entry.deadline);
        match next {
            Some(deadline) if deadline <= now => {
                if let Some(Reverse(entry)) = state.pending.pop() {
                    drop(state);
                    entry.task.run();
                    state = lock(&shared.state);
                }
            }
            Some(deadline) => {
                state = shared
                    .changed
                    .wait_timeout(state, deadline - now)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            }
            None => {
                state = shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    let cancelled: Vec<Entry> = state.pending.drain().map(|Reverse(entry)| entry).collect();
    drop(state);
    if !cancelled.is_empty() {
        debug!("timer cancelling {} pending delays", cancelled.len());
    }
    for entry in cancelled {
        entry.task.cancel();
    }
}
