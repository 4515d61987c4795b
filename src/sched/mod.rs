//! Task schedulers.
//!
//! Provides the [`Scheduler`] seam, the worker-pool and inline
//! implementations, and the process-wide scheduler the thread facades use.

pub mod builder;
pub mod inline;
pub mod pool;
pub mod task;
pub mod trait_def;

pub use builder::PoolBuilder;
pub use inline::InlineScheduler;
pub use pool::WorkerPool;
pub use task::{Task, TaskId, TaskStatus};
pub use trait_def::{PoolStats, Scheduler};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::error;

use crate::errors::{ScheduleError, ThreadResult};

static GLOBAL: spin::Once<Arc<dyn Scheduler>> = spin::Once::new();

/// Lock a std mutex, ignoring poisoning.
///
/// Task bodies run under `catch_unwind`, so a poisoned lock only means a
/// panic in scheduler bookkeeping; the protected data stays consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a worker pool and install it as the global scheduler.
///
/// Must run before anything touches [`global`]; afterwards it fails with
/// `AlreadyInitialized` and the freshly built pool is shut down.
pub fn init_global(builder: PoolBuilder) -> ThreadResult<()> {
    if GLOBAL.is_completed() {
        return Err(ScheduleError::AlreadyInitialized.into());
    }
    install_global(Arc::new(builder.build()?))
}

/// Install any scheduler as the global one.
pub fn install_global(scheduler: Arc<dyn Scheduler>) -> ThreadResult<()> {
    let mut installed = false;
    GLOBAL.call_once(|| {
        installed = true;
        scheduler
    });
    if installed {
        Ok(())
    } else {
        Err(ScheduleError::AlreadyInitialized.into())
    }
}

/// The process-wide scheduler.
///
/// Built on first use with [`PoolBuilder::new`]. If no worker thread can be
/// started, work runs inline on the submitting thread instead.
pub fn global() -> Arc<dyn Scheduler> {
    GLOBAL
        .call_once(|| match PoolBuilder::new().name("thread-shim-global").build() {
            Ok(pool) => Arc::new(pool) as Arc<dyn Scheduler>,
            Err(err) => {
                error!("failed to start the global worker pool: {}; running work inline", err);
                Arc::new(InlineScheduler::new())
            }
        })
        .clone()
}
