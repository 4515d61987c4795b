//! Fire-and-forget work items.
//!
//! A [`WorkItemQueue`] runs `callback(context)` on the scheduler and keeps
//! nothing: the submitter cannot wait for, cancel or inspect the item, and a
//! panicking callback is silently absorbed.

use std::sync::Arc;

use crate::sched::{self, Scheduler, Task};

/// A reusable callable taking one context value.
pub struct WaitCallback<C> {
    action: Arc<dyn Fn(C) + Send + Sync + 'static>,
}

impl<C> WaitCallback<C> {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(C) + Send + Sync + 'static,
    {
        Self {
            action: Arc::new(action),
        }
    }

    fn invoke(&self, context: C) {
        (*self.action)(context)
    }
}

impl<C> Clone for WaitCallback<C> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
        }
    }
}

impl<C> core::fmt::Debug for WaitCallback<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitCallback").finish_non_exhaustive()
    }
}

/// A callback paired with the context it will be called with.
#[derive(Debug)]
pub struct WorkItem<C> {
    callback: WaitCallback<C>,
    context: C,
}

impl<C: Send + 'static> WorkItem<C> {
    pub fn new(callback: WaitCallback<C>, context: C) -> Self {
        Self { callback, context }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    fn into_task(self) -> Task {
        let WorkItem { callback, context } = self;
        Task::new(move || callback.invoke(context))
    }
}

/// Submits work items to a scheduler.
#[derive(Clone)]
pub struct WorkItemQueue {
    scheduler: Arc<dyn Scheduler>,
}

impl WorkItemQueue {
    /// Queue on the global scheduler.
    pub fn new() -> Self {
        Self::with_scheduler(sched::global())
    }

    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Schedule `callback(context)` and return immediately.
    pub fn submit<C: Send + 'static>(&self, callback: &WaitCallback<C>, context: C) {
        self.submit_item(WorkItem::new(callback.clone(), context));
    }

    /// Schedule a prepared work item and return immediately.
    pub fn submit_item<C: Send + 'static>(&self, item: WorkItem<C>) {
        self.scheduler.schedule(item.into_task());
    }
}

impl Default for WorkItemQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for WorkItemQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkItemQueue")
            .field("stats", &self.scheduler.stats())
            .finish()
    }
}

/// Run `callback(context)` on the global scheduler, fire-and-forget.
pub fn queue_user_work_item<C: Send + 'static>(callback: &WaitCallback<C>, context: C) {
    WorkItemQueue::new().submit(callback, context);
}
