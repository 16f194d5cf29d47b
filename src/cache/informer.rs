// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! List/watch driver that keeps a [`SyncedCache`] current.
//!
//! # Loop
//!
//! ```text
//! ┌─► list ──► replace cache (add / update / tombstone delete) ──► mark synced
//! │              │
//! │              ▼
//! │   ┌─► watch(from last resource version)
//! │   │      ├─ Added / Modified / Deleted ─► update cache, fire callbacks
//! │   │      ├─ Bookmark ───────────────────► advance resource version
//! │   └──────├─ stream ended / error ───────► re-watch (with backoff)
//! └──────────└─ Expired ────────────────────► relist
//! ```
//!
//! Every await is raced against the stop channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ResourceEventHandler, SyncedCache};
use crate::resilience::retry::{retry, RetryConfig};
use crate::resource::{meta_namespace_key, DeletedFinalStateUnknown, DeletedObject, Resource};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The requested resource version is too old; the caller must relist.
    #[error("resource version expired")]
    Expired,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Full listing of a watched collection.
#[derive(Debug, Clone)]
pub struct ObjectList<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying only a resource version
    Bookmark(String),
}

pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, SourceError>>;

/// The notification source: a listable, watchable collection of objects.
#[async_trait]
pub trait ListWatch<K: Resource>: Send + Sync {
    async fn list(&self) -> Result<ObjectList<K>, SourceError>;

    /// Stream changes after `resource_version` (empty means "from now").
    async fn watch(&self, resource_version: &str) -> Result<WatchStream<K>, SourceError>;
}

pub struct Informer<K: Resource> {
    source: Arc<dyn ListWatch<K>>,
    cache: Arc<SyncedCache<K>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<K>>>>,
    retry: RetryConfig,
}

/// Resolves once `stop` flips to true or its sender is dropped.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

impl<K: Resource> Informer<K> {
    pub fn new(source: Arc<dyn ListWatch<K>>, retry: RetryConfig) -> Self {
        Self {
            source,
            cache: Arc::new(SyncedCache::new()),
            handlers: RwLock::new(Vec::new()),
            retry,
        }
    }

    pub fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<K>>) {
        self.handlers.write().push(handler);
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<SyncedCache<K>> {
        &self.cache
    }

    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.cache.has_synced()
    }

    #[must_use]
    pub fn last_sync_resource_version(&self) -> String {
        self.cache.last_sync_resource_version()
    }

    /// Run list/watch until `stop` is signalled.
    #[tracing::instrument(skip_all, fields(kind = K::KIND))]
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!("Starting informer");

        'relist: loop {
            if *stop.borrow() {
                break;
            }

            let listed = tokio::select! {
                result = retry("list", &self.retry, || self.source.list()) => result,
                _ = stopped(&mut stop) => break 'relist,
            };
            let list = match listed {
                Ok(list) => list,
                Err(e) => {
                    warn!(error = %e, "List failed, backing off before relisting");
                    if !self.sleep_or_stop(self.retry.max_delay, &mut stop).await {
                        break 'relist;
                    }
                    continue 'relist;
                }
            };

            let count = list.items.len();
            self.replace(list);
            if !self.cache.has_synced() {
                self.cache.mark_synced();
                info!(
                    objects = count,
                    resource_version = %self.cache.last_sync_resource_version(),
                    "Initial list applied, cache synced"
                );
            } else {
                debug!(objects = count, "Relist applied");
            }

            let mut delay = self.retry.initial_delay;
            loop {
                let resource_version = self.cache.last_sync_resource_version();
                let opened = tokio::select! {
                    result = self.source.watch(&resource_version) => result,
                    _ = stopped(&mut stop) => break 'relist,
                };

                let mut stream = match opened {
                    Ok(stream) => stream,
                    Err(SourceError::Expired) => {
                        info!(resource_version = %resource_version, "Watch resource version expired, relisting");
                        crate::metrics::record_watch_restart(K::KIND, "expired");
                        continue 'relist;
                    }
                    Err(e) => {
                        warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Failed to open watch");
                        crate::metrics::record_watch_restart(K::KIND, "error");
                        if !self.sleep_or_stop(delay, &mut stop).await {
                            break 'relist;
                        }
                        delay = self.retry.next_delay(delay);
                        continue;
                    }
                };

                let mut received = 0usize;
                loop {
                    let next = tokio::select! {
                        next = stream.next() => next,
                        _ = stopped(&mut stop) => break 'relist,
                    };

                    match next {
                        Some(Ok(event)) => {
                            received += 1;
                            delay = self.retry.initial_delay;
                            self.apply(event);
                        }
                        Some(Err(SourceError::Expired)) => {
                            info!("Watch expired mid-stream, relisting");
                            crate::metrics::record_watch_restart(K::KIND, "expired");
                            continue 'relist;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Watch stream error, re-watching");
                            crate::metrics::record_watch_restart(K::KIND, "error");
                            break;
                        }
                        None => {
                            debug!(received, "Watch stream closed, re-watching");
                            crate::metrics::record_watch_restart(K::KIND, "closed");
                            break;
                        }
                    }
                }

                if received == 0 {
                    if !self.sleep_or_stop(delay, &mut stop).await {
                        break 'relist;
                    }
                    delay = self.retry.next_delay(delay);
                }
            }
        }

        info!("Informer stopped");
    }

    /// Returns false if stopped while sleeping.
    async fn sleep_or_stop(&self, delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = stopped(stop) => false,
        }
    }

    /// Apply a full listing: new keys are adds, known keys updates, and
    /// keys missing from the listing are deleted with a tombstone.
    fn replace(&self, list: ObjectList<K>) {
        let mut listed = HashSet::with_capacity(list.items.len());
        for obj in list.items {
            if let Ok(key) = meta_namespace_key(&obj) {
                listed.insert(key);
            }
            self.upsert(obj);
        }

        for key in self.cache.keys() {
            if listed.contains(&key) {
                continue;
            }
            if let Some(obj) = self.cache.remove(&key) {
                debug!(key = %key, "Object vanished between lists");
                let tombstone = DeletedObject::Tombstone(DeletedFinalStateUnknown { key, obj });
                self.for_each_handler(|h| h.on_delete(&tombstone));
            }
        }

        self.cache.set_resource_version(&list.resource_version);
        crate::metrics::set_cache_objects(K::KIND, self.cache.len());
    }

    fn apply(&self, event: WatchEvent<K>) {
        match event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => self.upsert(obj),
            WatchEvent::Deleted(obj) => self.delete(obj),
            WatchEvent::Bookmark(resource_version) => {
                self.cache.set_resource_version(&resource_version);
            }
        }
        crate::metrics::set_cache_objects(K::KIND, self.cache.len());
    }

    fn upsert(&self, obj: K) {
        self.track_version(&obj);
        match meta_namespace_key(&obj) {
            Ok(key) => match self.cache.insert(key, obj.clone()) {
                Some(old) => self.for_each_handler(|h| h.on_update(&old, &obj)),
                None => self.for_each_handler(|h| h.on_add(&obj)),
            },
            Err(e) => {
                // Not cacheable, but the callbacks still get to see it
                warn!(error = %e, "Received object without a usable key");
                self.for_each_handler(|h| h.on_add(&obj));
            }
        }
    }

    fn delete(&self, obj: K) {
        self.track_version(&obj);
        if let Ok(key) = meta_namespace_key(&obj) {
            self.cache.remove(&key);
        }
        let deleted = DeletedObject::Object(obj);
        self.for_each_handler(|h| h.on_delete(&deleted));
    }

    fn track_version(&self, obj: &K) {
        if let Some(resource_version) = obj.metadata().resource_version.as_deref() {
            self.cache.set_resource_version(resource_version);
        }
    }

    fn for_each_handler(&self, f: impl Fn(&dyn ResourceEventHandler<K>)) {
        for handler in self.handlers.read().iter() {
            f(handler.as_ref());
        }
    }
}
