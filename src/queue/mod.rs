// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deduplicating work queue.
//!
//! [`WorkQueue`] decouples the cache callbacks (producers) from the relay
//! workers (consumers). Three sets track every item:
//!
//! ```text
//!   add() ──► dirty ──► queue ──► get() ──► processing ──► done()
//!               ▲                                │
//!               └──────── re-added while processing ◄┘
//! ```
//!
//! - An item that is already pending is not queued twice.
//! - An item re-added while a worker holds it is queued again only after
//!   [`WorkQueue::done`], so one item is never processed concurrently.
//! - After [`WorkQueue::shut_down`], `add` is ignored and `get` drains what
//!   is left before returning `None`.
//!
//! [`RateLimitingQueue`] layers per-item retry backoff on top.

pub mod rate_limiter;
mod rate_limiting;

pub use rate_limiter::{
    default_controller_rate_limiter, BucketRateLimiter, ItemExponentialFailureRateLimiter,
    MaxOfRateLimiter, RateLimiter,
};
pub use rate_limiting::RateLimitingQueue;

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct QueueState<T> {
    /// Items ready to be handed out, in insertion order
    queue: VecDeque<T>,
    /// Items that need processing (queued, or re-added while processing)
    dirty: HashSet<T>,
    /// Items currently held by a worker
    processing: HashSet<T>,
    shutting_down: bool,
}

/// Coalescing FIFO shared between producers and worker tasks.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T: Clone + Eq + Hash> WorkQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Mark an item as needing processing.
    pub fn add(&self, item: T) {
        let mut state = self.state.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shut down and empty. The caller must
    /// call [`done`](Self::done) with the item when finished.
    pub async fn get(&self) -> Option<T> {
        loop {
            // Register interest before looking, so an add() or shut_down()
            // between the check and the await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Finish processing an item, re-queueing it if it was re-added meanwhile.
    pub fn done(&self, item: &T) {
        let mut state = self.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting items and wake every waiting `get`.
    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Number of items waiting to be handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Eq + Hash> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
