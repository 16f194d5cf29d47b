// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Work queue with delayed, rate-limited re-adds.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

use super::rate_limiter::RateLimiter;
use super::WorkQueue;

struct Inner<T> {
    queue: WorkQueue<T>,
    limiter: Box<dyn RateLimiter<T>>,
    /// Cancels pending delayed adds
    shutdown: watch::Sender<bool>,
}

/// A [`WorkQueue`] that can re-add items after a backoff.
///
/// Cheap to clone; clones share the same queue.
pub struct RateLimitingQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RateLimitingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RateLimitingQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(limiter: impl RateLimiter<T> + 'static) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                queue: WorkQueue::new(),
                limiter: Box::new(limiter),
                shutdown,
            }),
        }
    }

    pub fn add(&self, item: T) {
        self.inner.queue.add(item);
    }

    /// See [`WorkQueue::get`].
    pub async fn get(&self) -> Option<T> {
        self.inner.queue.get().await
    }

    pub fn done(&self, item: &T) {
        self.inner.queue.done(item);
    }

    /// Add `item` once `delay` has elapsed.
    ///
    /// Must be called from within a tokio runtime when `delay` is non-zero.
    pub fn add_after(&self, item: T, delay: Duration) {
        if self.inner.queue.shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.inner.queue.add(item);
            return;
        }

        trace!(delay_ms = delay.as_millis() as u64, "Scheduling delayed add");
        let inner = self.inner.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => inner.queue.add(item),
                _ = shutdown.wait_for(|stopped| *stopped) => {}
            }
        });
    }

    /// Re-add `item` after the limiter's backoff for it.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.inner.limiter.when(&item);
        self.add_after(item, delay);
    }

    /// Clear retry history for `item`. Does not remove it from the queue.
    pub fn forget(&self, item: &T) {
        self.inner.limiter.forget(item);
    }

    #[must_use]
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.inner.limiter.num_requeues(item)
    }

    /// Stop accepting items, cancel delayed adds, and wake every `get`.
    pub fn shut_down(&self) {
        self.inner.queue.shut_down();
        self.inner.shutdown.send_replace(true);
    }

    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.inner.queue.shutting_down()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }
}
