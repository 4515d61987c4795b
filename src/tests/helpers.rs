//! Test helper utilities and common functionality.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::sched::{PoolBuilder, Scheduler, WorkerPool};

/// Worker pool dedicated to one test.
pub(crate) fn test_pool(workers: usize, name: &str) -> (Arc<WorkerPool>, Arc<dyn Scheduler>) {
    let pool = Arc::new(
        PoolBuilder::new()
            .worker_count(workers)
            .name(name)
            .build()
            .expect("test pool should start"),
    );
    let scheduler: Arc<dyn Scheduler> = pool.clone();
    (pool, scheduler)
}

/// One-way latch a work body can block on.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&self) {
        let (open, signal) = &*self.inner;
        *open.lock().unwrap() = true;
        signal.notify_all();
    }

    /// Wait until opened. Gives up after ten seconds so a broken test fails
    /// instead of hanging the suite.
    pub(crate) fn wait(&self) {
        self.wait_for(Duration::from_secs(10));
    }

    /// Wait until opened, panicking if `timeout` passes first.
    pub(crate) fn wait_for(&self, timeout: Duration) {
        let (open, signal) = &*self.inner;
        let guard = open.lock().unwrap();
        let (opened, _) = signal
            .wait_timeout_while(guard, timeout, |open| !*open)
            .unwrap();
        assert!(*opened, "gate was not opened within {:?}", timeout);
    }
}

/// Simple linear congruential generator for randomized tests.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 11
    }

    pub(crate) fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        min + (self.next_u64() % (max - min))
    }

    pub(crate) fn gen_bool(&mut self) -> bool {
        self.next_u64() & 1 == 0
    }
}

/// Poll a condition until it holds or the timeout expires.
macro_rules! assert_eventually {
    ($condition:expr, $timeout_ms:expr) => {{
        let start = std::time::Instant::now();
        let timeout = std::time::Duration::from_millis($timeout_ms);

        while !$condition {
            if start.elapsed() > timeout {
                panic!(
                    "Condition `{}` never became true within {}ms",
                    stringify!($condition),
                    $timeout_ms
                );
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }};
}

macro_rules! assert_thread_state {
    ($thread:expr, $expected:expr) => {
        assert_eq!(
            $thread.state(),
            $expected,
            "Thread {} expected state {:?}, found {:?}",
            $thread.id(),
            $expected,
            $thread.state()
        );
    };
}
