//! Cross-module tests for threads, work items and the schedulers under them.

#[macro_use]
mod helpers;
