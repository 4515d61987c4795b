//! Worker-pool scheduler.
//!
//! OS threads pull tasks from one shared FIFO run queue. Idle workers sleep on
//! a condition variable; a task body that panics is contained by the task
//! itself, so workers never die from user work.
//!
//! The pool keeps `worker_count` workers able to take new work. A worker that
//! blocks in [`Task::wait`] (which includes [`Thread::sleep`]) no longer
//! counts, and the pool starts a replacement up to its `max_workers` limit.
//! Surplus workers retire after sitting idle for `idle_timeout`.
//!
//! [`Thread::sleep`]: crate::thread::Thread::sleep

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use super::builder::PoolBuilder;
use super::lock;
use super::task::Task;
use super::trait_def::{PoolStats, Scheduler};
use crate::errors::{ScheduleError, SpawnError, ThreadError, ThreadResult};
use crate::time::DelayTimer;

thread_local! {
    /// Pool owning the calling worker thread.
    static WORKER_OF: RefCell<Option<Arc<Shared>>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct RunQueue {
    tasks: VecDeque<Task>,
    shutdown: bool,
    /// Worker threads started and not yet exited.
    live: usize,
    /// Live workers parked in a blocking wait.
    blocked: usize,
}

struct Shared {
    name: String,
    stack_size: Option<usize>,
    core: usize,
    max: usize,
    idle_timeout: Duration,
    queue: Mutex<RunQueue>,
    available: Condvar,
    handles: spin::Mutex<Vec<JoinHandle<()>>>,
    next_index: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
}

impl Shared {
    fn next_task(&self) -> Option<Task> {
        let mut queue = lock(&self.queue);
        loop {
            if let Some(task) = queue.tasks.pop_front() {
                return Some(task);
            }
            if queue.shutdown {
                queue.live -= 1;
                return None;
            }
            let (guard, waited) = self
                .available
                .wait_timeout(queue, self.idle_timeout)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
            if waited.timed_out()
                && queue.tasks.is_empty()
                && queue.live - queue.blocked > self.core
            {
                queue.live -= 1;
                return None;
            }
        }
    }

    /// Whether fewer than `core` workers can pick up new work.
    fn short_of_workers(&self, queue: &RunQueue) -> bool {
        !queue.shutdown && queue.live < self.max && queue.live - queue.blocked < self.core
    }

    fn spawn_worker(self: &Arc<Self>, queue: &mut RunQueue) -> Result<(), SpawnError> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            std::thread::Builder::new().name(format!("{}-worker-{}", self.name, index));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        let shared = Arc::clone(self);
        let handle = builder.spawn(move || worker_loop(shared, index))?;
        queue.live += 1;

        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Add one worker; the queue lock must be held.
    fn grow(self: &Arc<Self>, queue: &mut RunQueue) {
        match self.spawn_worker(queue) {
            Ok(()) => debug!(
                "worker pool '{}' grew to {} workers ({} blocked)",
                self.name, queue.live, queue.blocked
            ),
            Err(err) => warn!("worker pool '{}' could not grow: {}", self.name, err),
        }
    }
}

/// Marks the calling worker as blocked until dropped.
struct BlockedWorker {
    shared: Arc<Shared>,
}

impl BlockedWorker {
    fn enter(shared: Arc<Shared>) -> Self {
        {
            let mut queue = lock(&shared.queue);
            queue.blocked += 1;
            if shared.short_of_workers(&queue) {
                shared.grow(&mut queue);
            }
        }
        Self { shared }
    }
}

impl Drop for BlockedWorker {
    fn drop(&mut self) {
        lock(&self.shared.queue).blocked -= 1;
    }
}

/// Run a blocking `wait`, letting the pool replace the calling worker
/// meanwhile. Off the pool this only runs `wait`.
pub(crate) fn blocking<R>(wait: impl FnOnce() -> R) -> R {
    let shared = WORKER_OF.with(|slot| slot.borrow().clone());
    let _blocked = shared.map(BlockedWorker::enter);
    wait()
}

/// Scheduler backed by a pool of worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    timer: DelayTimer,
}

impl WorkerPool {
    /// Build a pool with default settings.
    pub fn new() -> ThreadResult<Self> {
        PoolBuilder::new().build()
    }

    pub(crate) fn start(config: PoolBuilder) -> ThreadResult<Self> {
        let name = config.name_prefix().to_owned();
        let timer = DelayTimer::start(&format!("{}-timer", name))?;
        let pool = Self {
            shared: Arc::new(Shared {
                name,
                stack_size: config.stack(),
                core: config.workers(),
                max: config.max(),
                idle_timeout: config.idle(),
                queue: Mutex::new(RunQueue::default()),
                available: Condvar::new(),
                handles: spin::Mutex::new(Vec::with_capacity(config.workers())),
                next_index: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
            timer,
        };

        for _ in 0..config.workers() {
            // On failure the partially built pool is dropped, which stops
            // the workers already running.
            pool.shared.spawn_worker(&mut lock(&pool.shared.queue))?;
        }

        info!(
            "worker pool '{}' started with {} workers (max {})",
            pool.shared.name, pool.shared.core, pool.shared.max
        );
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.shared.queue).shutdown
    }

    /// Queue a task, reporting why it was not queued.
    ///
    /// A task that was already handed to a scheduler is left untouched and
    /// yields `WrongState`. After shutdown the task is cancelled and the
    /// result is `ShutDown`.
    pub fn try_schedule(&self, task: Task) -> ThreadResult<()> {
        if !task.mark_scheduled() {
            return Err(ThreadError::wrong_state());
        }

        let mut queue = lock(&self.shared.queue);
        if queue.shutdown {
            drop(queue);
            task.cancel();
            return Err(ThreadError::shut_down());
        }
        queue.tasks.push_back(task);
        if self.shared.short_of_workers(&queue) {
            self.shared.grow(&mut queue);
        }
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Stop accepting work and join the workers.
    ///
    /// Queued tasks and pending delays are cancelled; bodies already running
    /// are allowed to finish. Called from one of the pool's own workers, that
    /// worker is not joined.
    pub fn shutdown(&self) {
        let drained: Vec<Task> = {
            let mut queue = lock(&self.shared.queue);
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            queue.tasks.drain(..).collect()
        };
        self.shared.available.notify_all();

        if !drained.is_empty() {
            debug!(
                "worker pool '{}' cancelling {} queued tasks",
                self.shared.name,
                drained.len()
            );
        }
        for task in &drained {
            task.cancel();
        }

        self.timer.shutdown();

        let current = std::thread::current().id();
        let handles = core::mem::take(&mut *self.shared.handles.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
        info!("worker pool '{}' shut down", self.shared.name);
    }
}

impl Scheduler for WorkerPool {
    fn schedule(&self, task: Task) {
        let id = task.id();
        match self.try_schedule(task) {
            Ok(()) => {}
            Err(ThreadError::Schedule(ScheduleError::ShutDown)) => debug!(
                "worker pool '{}' is shut down, cancelled task {}",
                self.shared.name, id
            ),
            Err(err) => warn!("task {} not queued on '{}': {}", id, self.shared.name, err),
        }
    }

    fn delay(&self, duration: Duration) -> Task {
        self.timer.delay(duration)
    }

    fn stats(&self) -> PoolStats {
        let queue = lock(&self.shared.queue);
        PoolStats {
            workers: queue.live,
            blocked: queue.blocked,
            queued: queue.tasks.len(),
            active: self.shared.active.load(Ordering::Acquire),
            completed: self.shared.completed.load(Ordering::Acquire),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    debug!("{}-worker-{} started", shared.name, index);
    WORKER_OF.with(|slot| *slot.borrow_mut() = Some(Arc::clone(&shared)));
    while let Some(task) = shared.next_task() {
        shared.active.fetch_add(1, Ordering::AcqRel);
        task.run();
        shared.active.fetch_sub(1, Ordering::AcqRel);
        shared.completed.fetch_add(1, Ordering::AcqRel);
    }
    WORKER_OF.with(|slot| slot.borrow_mut().take());
    debug!("{}-worker-{} exiting", shared.name, index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::TaskStatus;
    use std::sync::mpsc;
    use std::time::Instant;

    fn pool(workers: usize, name: &str) -> Arc<WorkerPool> {
        Arc::new(
            PoolBuilder::new()
                .worker_count(workers)
                .name(name)
                .build()
                .expect("pool should start"),
        )
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_runs_scheduled_tasks() {
        let pool = pool(2, "pool-test-run");
        let scheduler: Arc<dyn Scheduler> = pool.clone();

        let tasks: Vec<Task> = (0..8).map(|_| scheduler.spawn(|| {})).collect();
        for task in &tasks {
            task.wait();
            assert_eq!(task.status(), TaskStatus::RanToCompletion);
        }

        let stats = pool.stats();
        assert_eq!(stats.workers, 2);
        assert_eq!(stats.blocked, 0);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = pool(1, "pool-test-panic");
        let scheduler: Arc<dyn Scheduler> = pool.clone();

        let bad = scheduler.spawn(|| panic!("task failure"));
        bad.wait();
        assert_eq!(bad.status(), TaskStatus::Faulted);

        let good = scheduler.spawn(|| {});
        good.wait();
        assert_eq!(good.status(), TaskStatus::RanToCompletion);
    }

    #[test]
    fn test_rescheduling_is_ignored() {
        let pool = pool(1, "pool-test-resched");
        let task = Task::new(|| {});
        pool.schedule(task.clone());
        task.wait();

        pool.schedule(task.clone());
        assert_eq!(task.status(), TaskStatus::RanToCompletion);
        assert_eq!(pool.try_schedule(task), Err(ThreadError::wrong_state()));
    }

    #[test]
    fn test_blocked_workers_are_replaced() {
        let pool = pool(2, "pool-test-blocked");
        let scheduler: Arc<dyn Scheduler> = pool.clone();
        let gate = Task::new(|| {});

        let blockers: Vec<Task> = (0..2)
            .map(|_| {
                let gate = gate.clone();
                scheduler.spawn(move || gate.wait())
            })
            .collect();
        assert!(wait_until(Duration::from_secs(5), || pool.stats().blocked == 2));

        let follower = scheduler.spawn(|| {});
        assert!(follower.wait_timeout(Duration::from_secs(5)));
        assert_eq!(follower.status(), TaskStatus::RanToCompletion);
        assert!(pool.stats().workers >= 4);

        assert!(gate.cancel());
        for blocker in &blockers {
            assert!(blocker.wait_timeout(Duration::from_secs(5)));
            assert_eq!(blocker.status(), TaskStatus::RanToCompletion);
        }
        assert_eq!(pool.stats().blocked, 0);
    }

    #[test]
    fn test_surplus_workers_retire_when_idle() {
        let pool = Arc::new(
            PoolBuilder::new()
                .worker_count(1)
                .idle_timeout(Duration::from_millis(20))
                .name("pool-test-retire")
                .build()
                .expect("pool should start"),
        );
        let scheduler: Arc<dyn Scheduler> = pool.clone();

        let sleeper = scheduler.spawn(|| crate::Thread::sleep(50));
        assert!(wait_until(Duration::from_secs(5), || pool.stats().workers == 2));
        sleeper.wait();

        assert!(wait_until(Duration::from_secs(5), || pool.stats().workers == 1));
        let after = scheduler.spawn(|| {});
        assert!(after.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_growth_stops_at_max_workers() {
        let pool = Arc::new(
            PoolBuilder::new()
                .worker_count(1)
                .max_workers(2)
                .name("pool-test-max")
                .build()
                .expect("pool should start"),
        );
        let scheduler: Arc<dyn Scheduler> = pool.clone();
        let gate = Task::new(|| {});

        let blockers: Vec<Task> = (0..2)
            .map(|_| {
                let gate = gate.clone();
                scheduler.spawn(move || gate.wait())
            })
            .collect();
        assert!(wait_until(Duration::from_secs(5), || pool.stats().blocked == 2));
        assert_eq!(pool.stats().workers, 2);

        let starved = scheduler.spawn(|| {});
        assert!(!starved.wait_timeout(Duration::from_millis(50)));

        gate.cancel();
        assert!(starved.wait_timeout(Duration::from_secs(5)));
        for blocker in &blockers {
            blocker.wait();
        }
    }

    #[test]
    fn test_shutdown_cancels_queued_work() {
        let pool = pool(1, "pool-test-shutdown");
        let scheduler: Arc<dyn Scheduler> = pool.clone();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let blocker = scheduler.spawn(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        started_rx.recv().unwrap();
        let queued = scheduler.spawn(|| panic!("must not run"));
        assert_eq!(pool.stats().queued, 1);

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            release_tx.send(()).unwrap();
        });
        pool.shutdown();
        releaser.join().unwrap();

        assert_eq!(queued.status(), TaskStatus::Canceled);
        assert_eq!(blocker.status(), TaskStatus::RanToCompletion);
        assert!(pool.is_shut_down());

        let late = scheduler.spawn(|| {});
        assert_eq!(late.status(), TaskStatus::Canceled);
        assert_eq!(
            pool.delay(Duration::from_millis(5)).status(),
            TaskStatus::Canceled
        );
    }

    #[test]
    fn test_try_schedule_after_shutdown_reports_shut_down() {
        let pool = pool(1, "pool-test-try");
        pool.shutdown();

        let task = Task::new(|| panic!("must not run"));
        assert_eq!(pool.try_schedule(task.clone()), Err(ThreadError::shut_down()));
        assert_eq!(task.status(), TaskStatus::Canceled);
        assert_eq!(pool.stats().workers, 0);
    }

    #[test]
    fn test_delay_uses_pool_timer() {
        let pool = pool(1, "pool-test-delay");
        let start = Instant::now();
        pool.delay(Duration::from_millis(20)).wait();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
