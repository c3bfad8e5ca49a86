//! Integration tests for resilience module
//!
//! Exercises the rate limiter and task group together the way destination
//! fan-out uses them: several accounts sharing one limiter, one of them
//! tripping the rate limit.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use busysync_common::resilience::{RateLimiter, RateLimiterConfig, TaskGroup};
use tokio::time::Instant;

/// Custom error type for testing
#[derive(Debug, Clone, PartialEq, Eq)]
enum TestError {
    RateLimited,
    Failed(String),
}

/// A rate limit signal from one task delays tasks queued behind it, and
/// the retried call succeeds once the window elapses.
#[tokio::test(start_paused = true)]
async fn test_rate_limit_signal_delays_queued_tasks() {
    let limiter = Arc::new(
        RateLimiter::new(RateLimiterConfig { max_concurrent: 1, ..RateLimiterConfig::default() })
            .unwrap(),
    );
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let call = {
        let limiter = limiter.clone();
        let attempts = attempts.clone();
        move || {
            let attempts = attempts.clone();
            let limiter = limiter.clone();
            async move {
                limiter
                    .execute(|| async {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(TestError::RateLimited)
                        } else {
                            Ok("done")
                        }
                    })
                    .await
            }
        }
    };

    let first = call().await;
    assert_eq!(first, Err(TestError::RateLimited));
    limiter.report_rate_limit();

    let second = call().await;
    assert_eq!(second, Ok("done"));
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(limiter.current_backoff(), Duration::from_secs(1));
}

/// Failures in one task do not affect sibling results.
#[tokio::test]
async fn test_task_group_isolates_failures_with_shared_limiter() {
    let limiter = Arc::new(RateLimiter::with_defaults());
    let mut group = TaskGroup::new();

    for account in 0..4u32 {
        let limiter = limiter.clone();
        group.spawn(format!("account-{account}"), async move {
            limiter
                .execute(|| async move {
                    if account == 2 {
                        Err(TestError::Failed("token revoked".to_string()))
                    } else {
                        Ok(account)
                    }
                })
                .await
        });
    }

    let outcomes = group.join_all().await;
    assert_eq!(outcomes.len(), 4);

    let succeeded: Vec<u32> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().and_then(|r| r.as_ref().ok()).copied())
        .collect();
    assert_eq!(succeeded, vec![0, 1, 3]);
    assert_eq!(outcomes[2].label, "account-2");
    assert!(matches!(outcomes[2].result, Ok(Err(TestError::Failed(_)))));
}
