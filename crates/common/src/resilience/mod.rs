//! Resilience primitives for outbound calls.
//!
//! - [`RateLimiter`]: bounded FIFO concurrency with exponential backoff on
//!   rate limit signals
//! - [`TaskGroup`]: concurrent fan-out collecting one outcome per task

pub mod rate_limiter;
pub mod task_group;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use task_group::{TaskFailure, TaskGroup, TaskOutcome};
