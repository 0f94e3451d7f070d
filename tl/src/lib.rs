//! TaskLimit - Bounded-concurrency job limiter
//!
//! TaskLimit accepts an unbounded stream of asynchronous jobs and keeps at
//! most a fixed number of them in flight at once, queuing the rest in
//! arrival order. It is the throttling primitive to put in front of
//! rate-limited resources: API clients, connection pools, subprocess
//! fan-out.
//!
//! # Core Concepts
//!
//! - **FIFO Admission**: jobs start in the order they were scheduled
//! - **Hard Ceiling**: the active count never exceeds the configured limit
//! - **Isolated Failures**: a panicking job surfaces only through its own
//!   handle and never stalls the rest of the queue
//! - **One-Shot Outcomes**: every `schedule` call returns a handle that
//!   settles exactly once with that job's own result
//!
//! # Modules
//!
//! - [`limiter`] - Admission queue, concurrency gate, and dispatch loop

pub mod limiter;

// Re-export commonly used types
pub use limiter::{Concurrency, JobHandle, Limiter, LimiterConfig, LimiterError, LimiterStats};
