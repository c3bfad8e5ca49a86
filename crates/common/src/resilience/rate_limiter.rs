//! Per-destination rate limiter
//!
//! Tasks are admitted through a fair semaphore, so queued tasks start in FIFO
//! order as slots free. When a caller observes a rate limit signal it calls
//! [`RateLimiter::report_rate_limit`]; no task starts until the backoff window
//! has elapsed, and each further signal doubles the window up to a cap. Any
//! successful task resets the window to its initial value.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{CommonError, CommonResult};

/// Configuration for rate limiter behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of tasks running at once
    pub max_concurrent: usize,
    /// Backoff applied by the first rate limit signal
    pub initial_backoff: Duration,
    /// Upper bound for the backoff window
    pub max_backoff: Duration,
    /// Growth factor applied after each signal
    pub multiplier: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2,
        }
    }
}

impl RateLimiterConfig {
    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.max_concurrent == 0 {
            return Err(CommonError::config("max_concurrent", "must be greater than 0"));
        }
        if self.multiplier == 0 {
            return Err(CommonError::config("multiplier", "must be greater than 0"));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(CommonError::config(
                "initial_backoff",
                "must not exceed max_backoff",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BackoffState {
    backoff_until: Option<Instant>,
    current_backoff: Duration,
}

/// Bounded-concurrency limiter with exponential backoff.
///
/// ```rust
/// use busysync_common::resilience::{RateLimiter, RateLimiterConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RateLimiter::new(RateLimiterConfig::default())?;
/// let value = limiter.execute(|| async { Ok::<_, std::io::Error>(42) }).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    permits: Semaphore,
    state: Mutex<BackoffState>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration
    pub fn new(config: RateLimiterConfig) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self {
            permits: Semaphore::new(config.max_concurrent),
            state: Mutex::new(BackoffState {
                backoff_until: None,
                current_backoff: config.initial_backoff,
            }),
            config,
        })
    }

    /// Limiter with [`RateLimiterConfig::default`], which always validates.
    pub fn with_defaults() -> Self {
        let config = RateLimiterConfig::default();
        Self {
            permits: Semaphore::new(config.max_concurrent),
            state: Mutex::new(BackoffState {
                backoff_until: None,
                current_backoff: config.initial_backoff,
            }),
            config,
        }
    }

    /// Configuration the limiter was built with.
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Run `task` once a slot is free and any backoff window has elapsed.
    ///
    /// Waiting tasks start in arrival order. The task's own error is returned
    /// unchanged.
    pub async fn execute<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // The semaphore is never closed, so acquisition only fails if that
        // changes; in that case the task still runs.
        let _permit = self.permits.acquire().await.ok();
        self.wait_for_backoff().await;

        let result = task().await;
        if result.is_ok() {
            self.reset_backoff();
        }
        result
    }

    /// Record a rate limit signal from the destination.
    ///
    /// Blocks new task starts for the current backoff, then grows the backoff
    /// for the next signal.
    pub fn report_rate_limit(&self) {
        self.report_rate_limit_with_hint(None);
    }

    /// Like [`report_rate_limit`](Self::report_rate_limit), honouring a
    /// server-provided `Retry-After` when it is longer than the current
    /// backoff.
    pub fn report_rate_limit_with_hint(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock();
        let wait = retry_after.map_or(state.current_backoff, |hint| hint.max(state.current_backoff));
        let until = Instant::now() + wait;
        state.backoff_until = Some(state.backoff_until.map_or(until, |existing| existing.max(until)));
        state.current_backoff = state
            .current_backoff
            .saturating_mul(self.config.multiplier)
            .min(self.config.max_backoff);

        warn!(
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            next_backoff_ms = u64::try_from(state.current_backoff.as_millis()).unwrap_or(u64::MAX),
            "Rate limit reported, pausing new requests"
        );
    }

    /// Backoff the next signal will apply.
    pub fn current_backoff(&self) -> Duration {
        self.state.lock().current_backoff
    }

    /// Time left before queued tasks may start.
    pub fn backoff_remaining(&self) -> Duration {
        self.state
            .lock()
            .backoff_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(Instant::now()))
    }

    async fn wait_for_backoff(&self) {
        // Re-check after sleeping: another task may have extended the window.
        loop {
            let until = self.state.lock().backoff_until;
            match until {
                Some(until) if until > Instant::now() => {
                    debug!("Waiting for rate limit backoff");
                    tokio::time::sleep_until(until).await;
                }
                _ => return,
            }
        }
    }

    fn reset_backoff(&self) {
        let mut state = self.state.lock();
        state.current_backoff = self.config.initial_backoff;
    }
}
