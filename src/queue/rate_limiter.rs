// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry rate limiters.
//!
//! A [`RateLimiter`] decides how long a failed item waits before it is
//! queued again, and remembers how many times each item has been retried.
//!
//! # Example
//!
//! ```
//! use event_relay::queue::{ItemExponentialFailureRateLimiter, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = ItemExponentialFailureRateLimiter::new(
//!     Duration::from_millis(5),
//!     Duration::from_secs(1),
//! );
//!
//! assert_eq!(limiter.when(&"ns/foo"), Duration::from_millis(5));
//! assert_eq!(limiter.when(&"ns/foo"), Duration::from_millis(10));
//! assert_eq!(limiter.num_requeues(&"ns/foo"), 2);
//!
//! limiter.forget(&"ns/foo");
//! assert_eq!(limiter.num_requeues(&"ns/foo"), 0);
//! ```

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Decides the delay before a failed item is retried.
pub trait RateLimiter<T>: Send + Sync {
    /// Delay for the next retry of `item`. Counts as a retry.
    fn when(&self, item: &T) -> Duration;

    /// Drop all retry history for `item`.
    fn forget(&self, item: &T);

    /// Retries recorded for `item` since it was last forgotten.
    fn num_requeues(&self, item: &T) -> u32;
}

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ItemExponentialFailureRateLimiter<T: Eq + Hash> {
    failures: DashMap<T, u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Eq + Hash> ItemExponentialFailureRateLimiter<T> {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            failures: DashMap::new(),
            base_delay,
            max_delay,
        }
    }
}

impl<T: Clone + Eq + Hash + Send + Sync> RateLimiter<T> for ItemExponentialFailureRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        let exp = {
            let mut failures = self.failures.entry(item.clone()).or_insert(0);
            let exp = *failures;
            *failures = failures.saturating_add(1);
            exp
        };

        2u32.checked_pow(exp)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |backoff| backoff.min(self.max_delay))
    }

    fn forget(&self, item: &T) {
        self.failures.remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures.get(item).map_or(0, |f| *f)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket shared by every item.
///
/// Each call to `when` reserves one token and returns how long the caller
/// has to wait for it. Does not track per-item history.
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    /// A non-positive `qps` disables limiting.
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    fn reserve(&self) -> Duration {
        if self.qps <= 0.0 {
            return Duration::ZERO;
        }
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.qps)
        }
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(&self, _item: &T) -> Duration {
        self.reserve()
    }

    fn forget(&self, _item: &T) {}

    fn num_requeues(&self, _item: &T) -> u32 {
        0
    }
}

/// Combines limiters: the longest delay and the highest retry count win.
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Box<dyn RateLimiter<T>>>,
}

impl<T> MaxOfRateLimiter<T> {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter<T>>>) -> Self {
        Self { limiters }
    }
}

impl<T> RateLimiter<T> for MaxOfRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(item))
            .max()
            .unwrap_or_default()
    }

    fn forget(&self, item: &T) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// Per-item exponential backoff combined with an overall token bucket.
#[must_use]
pub fn default_controller_rate_limiter<T>(
    base_delay: Duration,
    max_delay: Duration,
    qps: f64,
    burst: u32,
) -> MaxOfRateLimiter<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    let limiters: Vec<Box<dyn RateLimiter<T>>> = vec![
        Box::new(ItemExponentialFailureRateLimiter::new(base_delay, max_delay)),
        Box::new(BucketRateLimiter::new(qps, burst)),
    ];
    MaxOfRateLimiter::new(limiters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles_per_item() {
        let limiter = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        );

        let delays: Vec<_> = (0..5).map(|_| limiter.when(&"ns/baz")).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );

        // Other items have their own history
        assert_eq!(limiter.when(&"ns/other"), Duration::from_millis(5));
        assert_eq!(limiter.num_requeues(&"ns/baz"), 5);
        assert_eq!(limiter.num_requeues(&"ns/other"), 1);
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let limiter = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_millis(30),
        );
        for _ in 0..3 {
            limiter.when(&1);
        }
        assert_eq!(limiter.when(&1), Duration::from_millis(30));

        // Far past the point where 2^n overflows
        for _ in 0..100 {
            limiter.when(&1);
        }
        assert_eq!(limiter.when(&1), Duration::from_millis(30));
    }

    #[test]
    fn test_forget_resets_history() {
        let limiter = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1),
        );
        limiter.when(&"k");
        limiter.when(&"k");
        limiter.forget(&"k");

        assert_eq!(limiter.num_requeues(&"k"), 0);
        assert_eq!(limiter.when(&"k"), Duration::from_millis(5));
    }

    #[test]
    fn test_bucket_allows_burst_then_delays() {
        let limiter = BucketRateLimiter::new(10.0, 3);

        for _ in 0..3 {
            assert_eq!(RateLimiter::<u32>::when(&limiter, &0), Duration::ZERO);
        }
        let delay = RateLimiter::<u32>::when(&limiter, &0);
        assert!(delay > Duration::ZERO);
        assert!(delay <= Duration::from_millis(100));
        assert_eq!(RateLimiter::<u32>::num_requeues(&limiter, &0), 0);
    }

    #[test]
    fn test_bucket_disabled_with_zero_qps() {
        let limiter = BucketRateLimiter::new(0.0, 1);
        for _ in 0..10 {
            assert_eq!(RateLimiter::<u32>::when(&limiter, &0), Duration::ZERO);
        }
    }

    #[test]
    fn test_max_of_takes_longest_delay() {
        let limiter = default_controller_rate_limiter::<&str>(
            Duration::from_millis(5),
            Duration::from_secs(1000),
            10.0,
            100,
        );

        assert_eq!(limiter.when(&"ns/foo"), Duration::from_millis(5));
        assert_eq!(limiter.when(&"ns/foo"), Duration::from_millis(10));
        assert_eq!(limiter.num_requeues(&"ns/foo"), 2);

        limiter.forget(&"ns/foo");
        assert_eq!(limiter.num_requeues(&"ns/foo"), 0);
    }
}
