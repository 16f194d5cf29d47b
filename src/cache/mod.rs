// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronized cache of watched objects.
//!
//! ```text
//!  ListWatch source ──► Informer ──► SyncedCache (DashMap, single writer)
//!                          │
//!                          └──► ResourceEventHandler callbacks
//!                                 └── QueueingEventHandler ──► work queue
//! ```
//!
//! The [`Informer`] is the only writer. Workers read the cache concurrently
//! to check that a queued key still resolves.

mod feed;
mod handler;
mod informer;

pub use feed::FeedSource;
pub use handler::QueueingEventHandler;
pub use informer::{Informer, ListWatch, ObjectList, SourceError, WatchEvent, WatchStream};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::resource::DeletedObject;

/// Callbacks fired by the informer after it has updated the cache.
///
/// Called inline on the informer task; implementations must not block.
pub trait ResourceEventHandler<K>: Send + Sync {
    fn on_add(&self, obj: &K);

    fn on_update(&self, old: &K, new: &K);

    fn on_delete(&self, deleted: &DeletedObject<K>);
}

/// Latest known state of every watched object, keyed by `namespace/name`.
pub struct SyncedCache<K> {
    objects: DashMap<String, K>,
    synced: watch::Sender<bool>,
    last_sync_resource_version: RwLock<String>,
}

impl<K: Clone> SyncedCache<K> {
    #[must_use]
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            objects: DashMap::new(),
            synced,
            last_sync_resource_version: RwLock::new(String::new()),
        }
    }

    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<K> {
        self.objects.get(key).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|r| r.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True once the initial listing has been applied. Never goes back.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Resource version of the last list, watch event or bookmark applied.
    #[must_use]
    pub fn last_sync_resource_version(&self) -> String {
        self.last_sync_resource_version.read().clone()
    }

    /// Resolve once the initial listing has been applied.
    pub async fn wait_for_sync(&self) {
        let mut rx = self.synced.subscribe();
        // The sender lives in self, so this only returns once synced
        let _ = rx.wait_for(|synced| *synced).await;
    }

    pub(crate) fn insert(&self, key: String, obj: K) -> Option<K> {
        self.objects.insert(key, obj)
    }

    pub(crate) fn remove(&self, key: &str) -> Option<K> {
        self.objects.remove(key).map(|(_, obj)| obj)
    }

    pub(crate) fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    pub(crate) fn set_resource_version(&self, resource_version: &str) {
        if !resource_version.is_empty() {
            *self.last_sync_resource_version.write() = resource_version.to_string();
        }
    }
}

impl<K: Clone> Default for SyncedCache<K> {
    fn default() -> Self {
        Self::new()
    }
}
