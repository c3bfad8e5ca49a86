//! Rate limiters keyed by destination
//!
//! Backoff state must outlive a single sync pass, so adapters borrow their
//! limiter from this registry instead of owning one.

use std::sync::Arc;
use std::time::Duration;

use busysync_common::{RateLimiter, RateLimiterConfig};
use busysync_domain::{RateLimitConfig, Result};
use dashmap::DashMap;

use crate::errors::InfraError;

/// One [`RateLimiter`] per destination, created on first use.
pub struct RateLimiterRegistry {
    config: RateLimiterConfig,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    /// # Errors
    /// Returns `BusySyncError::Config` when the limiter settings are invalid.
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        let config = RateLimiterConfig {
            max_concurrent: config.max_concurrent,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        };
        config.validate().map_err(InfraError::from)?;
        Ok(Self { config, limiters: DashMap::new() })
    }

    /// Limiter for `destination_id`, created on first use.
    pub fn limiter_for(&self, destination_id: &str) -> Result<Arc<RateLimiter>> {
        if let Some(existing) = self.limiters.get(destination_id) {
            return Ok(existing.clone());
        }

        let limiter = self
            .limiters
            .entry(destination_id.to_string())
            .or_try_insert_with(|| RateLimiter::new(self.config).map(Arc::new))
            .map_err(InfraError::from)?;
        Ok(limiter.value().clone())
    }

    /// Drop the limiter of a removed destination.
    pub fn remove(&self, destination_id: &str) -> bool {
        self.limiters.remove(destination_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
