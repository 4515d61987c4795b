//! Error types for the scheduler and bootstrap surfaces.
//!
//! The thread and work-queue facades never return these: faults raised by
//! scheduled work are absorbed by the scheduler. Errors only come out of
//! pool construction, global installation and task bookkeeping.

#![allow(clippy::uninlined_format_args)]

use std::fmt;

/// Result type for scheduler operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// Worker pool construction errors
    Spawn(SpawnError),
    /// Scheduling errors
    Schedule(ScheduleError),
    /// Invalid operation errors
    InvalidOperation(InvalidOperationError),
}

/// Errors that can occur while building a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// A pool needs at least one worker
    InvalidWorkerCount(usize),
    /// Invalid stack size specified
    InvalidStackSize(usize),
    /// Worker name prefix is invalid
    InvalidName(String),
    /// The operating system refused to start a worker thread
    WorkerSpawnFailed(String),
}

/// Errors related to scheduling operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The scheduler has been shut down
    ShutDown,
    /// The global scheduler was already installed
    AlreadyInitialized,
}

/// Invalid operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperationError {
    /// Operation called in wrong state
    WrongState,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Spawn(e) => write!(f, "Worker spawn error: {}", e),
            ThreadError::Schedule(e) => write!(f, "Scheduling error: {}", e),
            ThreadError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::InvalidWorkerCount(count) => write!(f, "Invalid worker count: {}", count),
            SpawnError::InvalidStackSize(size) => write!(f, "Invalid stack size: {}", size),
            SpawnError::InvalidName(name) => write!(f, "Invalid worker name: {:?}", name),
            SpawnError::WorkerSpawnFailed(reason) => write!(f, "Failed to start worker: {}", reason),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::ShutDown => write!(f, "Scheduler has been shut down"),
            ScheduleError::AlreadyInitialized => write!(f, "Global scheduler already initialized"),
        }
    }
}

impl fmt::Display for InvalidOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidOperationError::WrongState => write!(f, "Operation called in wrong state"),
        }
    }
}

impl std::error::Error for ThreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThreadError::Spawn(e) => Some(e),
            ThreadError::Schedule(e) => Some(e),
            ThreadError::InvalidOperation(e) => Some(e),
        }
    }
}

impl std::error::Error for SpawnError {}
impl std::error::Error for ScheduleError {}
impl std::error::Error for InvalidOperationError {}

impl From<SpawnError> for ThreadError {
    fn from(error: SpawnError) -> Self {
        ThreadError::Spawn(error)
    }
}

impl From<ScheduleError> for ThreadError {
    fn from(error: ScheduleError) -> Self {
        ThreadError::Schedule(error)
    }
}

impl From<InvalidOperationError> for ThreadError {
    fn from(error: InvalidOperationError) -> Self {
        ThreadError::InvalidOperation(error)
    }
}

impl From<std::io::Error> for SpawnError {
    fn from(error: std::io::Error) -> Self {
        SpawnError::WorkerSpawnFailed(error.to_string())
    }
}

impl ThreadError {
    /// Create a wrong-state error.
    pub fn wrong_state() -> Self {
        ThreadError::InvalidOperation(InvalidOperationError::WrongState)
    }

    /// Create a shut-down error.
    pub fn shut_down() -> Self {
        ThreadError::Schedule(ScheduleError::ShutDown)
    }
}
