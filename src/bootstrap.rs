//! Application entry contract.
//!
//! Constructs one top-level application on the calling thread, runs it, and
//! releases it on every exit path.

use std::panic::{self, AssertUnwindSafe};

use log::{error, info};

/// A top-level application object, typically a main loop.
///
/// Resources are released by `Drop`.
pub trait Application {
    fn run(&mut self);
}

/// Construct and run an application on the calling thread.
///
/// The application is dropped before this returns, including when `run`
/// panics; the panic is then resumed.
pub fn run<A, F>(construct: F)
where
    A: Application,
    F: FnOnce() -> A,
{
    let mut app = construct();
    info!("application starting");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| app.run()));
    drop(app);

    match outcome {
        Ok(()) => info!("application exited"),
        Err(payload) => {
            error!("application panicked, resources released");
            panic::resume_unwind(payload);
        }
    }
}
