use std::time::Duration;

use super::pool::WorkerPool;
use crate::errors::{SpawnError, ThreadResult};

/// Default prefix for worker thread names.
pub const DEFAULT_NAME_PREFIX: &str = "thread-shim";

/// Smallest stack a worker may be given.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Default limit on workers, including replacements for blocked ones.
pub const DEFAULT_MAX_WORKERS: usize = 256;

/// How long a surplus worker stays idle before it exits.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    worker_count: usize,
    max_workers: Option<usize>,
    idle_timeout: Duration,
    name_prefix: String,
    stack_size: Option<usize>,
}

impl PoolBuilder {
    /// One worker per available core, at least two.
    pub fn new() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .max(2);
        Self {
            worker_count,
            max_workers: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            name_prefix: DEFAULT_NAME_PREFIX.into(),
            stack_size: None,
        }
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Upper bound on live workers while some of them are blocked.
    pub fn max_workers(mut self, max: usize) -> Self {
        self.max_workers = Some(max);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Prefix for worker and timer thread names.
    pub fn name<T: Into<String>>(mut self, prefix: T) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub(crate) fn workers(&self) -> usize {
        self.worker_count
    }

    pub(crate) fn max(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| DEFAULT_MAX_WORKERS.max(self.worker_count))
    }

    pub(crate) fn idle(&self) -> Duration {
        self.idle_timeout
    }

    pub(crate) fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub(crate) fn stack(&self) -> Option<usize> {
        self.stack_size
    }

    /// Check the configuration without starting anything.
    pub fn validate(&self) -> Result<(), SpawnError> {
        if self.worker_count == 0 {
            return Err(SpawnError::InvalidWorkerCount(self.worker_count));
        }
        if self.max() < self.worker_count {
            return Err(SpawnError::InvalidWorkerCount(self.max()));
        }
        if self.name_prefix.is_empty() || self.name_prefix.contains('\0') {
            return Err(SpawnError::InvalidName(self.name_prefix.clone()));
        }
        match self.stack_size {
            Some(size) if size < MIN_STACK_SIZE => Err(SpawnError::InvalidStackSize(size)),
            _ => Ok(()),
        }
    }

    /// Start the worker threads and the delay timer.
    pub fn build(self) -> ThreadResult<WorkerPool> {
        self.validate()?;
        WorkerPool::start(self)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
