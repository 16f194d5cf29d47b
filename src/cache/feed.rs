// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process notification source.
//!
//! [`FeedSource`] is a versioned object collection that speaks
//! [`ListWatch`]: every mutation bumps a monotonically increasing resource
//! version, is appended to a bounded history, and is broadcast to open
//! watches. A watch that asks for a version older than the retained history
//! (or falls behind the broadcast buffer) gets [`SourceError::Expired`].
//!
//! Used by the demo binary and the test suites as a stand-in for a cluster
//! API server.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::informer::{ListWatch, ObjectList, SourceError, WatchEvent, WatchStream};
use crate::resource::{meta_namespace_key, KeyError, Resource};

const DEFAULT_HISTORY_LIMIT: usize = 1024;
const BROADCAST_CAPACITY: usize = 1024;

struct FeedState<K> {
    objects: BTreeMap<String, K>,
    version: u64,
    history: VecDeque<(u64, WatchEvent<K>)>,
    history_limit: usize,
    events: broadcast::Sender<WatchEvent<K>>,
}

impl<K: Clone> FeedState<K> {
    /// Called with the state lock held so that history and broadcast order
    /// agree with version order.
    fn publish(&mut self, event: WatchEvent<K>) -> u64 {
        self.version += 1;
        let version = self.version;
        self.history.push_back((version, event.clone()));
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        // No receivers is fine
        let _ = self.events.send(event);
        version
    }
}

pub struct FeedSource<K: Resource> {
    state: Mutex<FeedState<K>>,
}

impl<K: Resource> FeedSource<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Retain at most `limit` past events for watches that resume from an
    /// older resource version.
    #[must_use]
    pub fn with_history_limit(limit: usize) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: Mutex::new(FeedState {
                objects: BTreeMap::new(),
                version: 0,
                history: VecDeque::new(),
                history_limit: limit,
                events,
            }),
        }
    }

    /// Insert a new object. Returns the resource version assigned to it.
    pub fn add(&self, obj: K) -> Result<u64, KeyError> {
        self.upsert(obj, WatchEvent::Added)
    }

    /// Replace an object. Returns the resource version assigned to it.
    pub fn update(&self, obj: K) -> Result<u64, KeyError> {
        self.upsert(obj, WatchEvent::Modified)
    }

    /// Remove the object stored under `key`, if any.
    pub fn delete(&self, key: &str) -> Option<u64> {
        let mut state = self.state.lock();
        let mut obj = state.objects.remove(key)?;
        let version = state.version + 1;
        obj.metadata_mut().resource_version = Some(version.to_string());
        Some(state.publish(WatchEvent::Deleted(obj)))
    }

    /// Send a progress marker at the current resource version to open watches.
    pub fn bookmark(&self) -> u64 {
        let state = self.state.lock();
        let _ = state.events.send(WatchEvent::Bookmark(state.version.to_string()));
        state.version
    }

    /// Drop all retained history, so resuming watches must relist.
    pub fn compact(&self) {
        self.state.lock().history.clear();
    }

    /// End every open watch stream, as a server restart would.
    pub fn close_watches(&self) {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        self.state.lock().events = events;
    }

    #[must_use]
    pub fn resource_version(&self) -> u64 {
        self.state.lock().version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().objects.is_empty()
    }

    fn upsert(&self, mut obj: K, wrap: fn(K) -> WatchEvent<K>) -> Result<u64, KeyError> {
        let key = meta_namespace_key(&obj)?;
        let mut state = self.state.lock();
        let version = state.version + 1;
        obj.metadata_mut().resource_version = Some(version.to_string());
        state.objects.insert(key, obj.clone());
        Ok(state.publish(wrap(obj)))
    }
}

impl<K: Resource> Default for FeedSource<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: Resource> ListWatch<K> for FeedSource<K> {
    async fn list(&self) -> Result<ObjectList<K>, SourceError> {
        let state = self.state.lock();
        Ok(ObjectList {
            items: state.objects.values().cloned().collect(),
            resource_version: state.version.to_string(),
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream<K>, SourceError> {
        let (backlog, receiver) = {
            let state = self.state.lock();
            let from = if resource_version.is_empty() {
                state.version
            } else {
                resource_version
                    .parse::<u64>()
                    .map_err(|_| SourceError::Expired)?
            };

            if from < state.version {
                // Every event after `from` must still be in history
                let oldest = state.history.front().map(|(v, _)| *v);
                if oldest.map_or(true, |oldest| oldest > from + 1) {
                    debug!(from, current = state.version, "Watch version older than history");
                    return Err(SourceError::Expired);
                }
            }

            let backlog: Vec<WatchEvent<K>> = state
                .history
                .iter()
                .filter(|(v, _)| *v > from)
                .map(|(_, event)| event.clone())
                .collect();
            (backlog, state.events.subscribe())
        };

        let live = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Watch fell behind the feed");
                    Some((Err(SourceError::Expired), receiver))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });

        Ok(stream::iter(backlog.into_iter().map(Ok)).chain(live).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ClusterEvent, ObjectMeta};

    fn event(name: &str) -> ClusterEvent {
        ClusterEvent::new(ObjectMeta::namespaced("ns", name))
    }

    #[tokio::test]
    async fn test_list_reflects_mutations() {
        let feed = FeedSource::new();
        assert_eq!(feed.add(event("a")).unwrap(), 1);
        assert_eq!(feed.add(event("b")).unwrap(), 2);
        assert_eq!(feed.delete("ns/a"), Some(3));
        assert_eq!(feed.delete("ns/missing"), None);

        let list = feed.list().await.unwrap();
        assert_eq!(list.resource_version, "3");
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].metadata.name, "b");
        assert_eq!(list.items[0].metadata.resource_version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_watch_replays_history_then_streams_live() {
        let feed = FeedSource::new();
        feed.add(event("a")).unwrap();
        feed.add(event("b")).unwrap();

        let mut watch = feed.watch("1").await.unwrap();
        feed.update(event("a")).unwrap();

        let replayed = watch.next().await.unwrap().unwrap();
        assert!(matches!(replayed, WatchEvent::Added(ref e) if e.metadata.name == "b"));
        let live = watch.next().await.unwrap().unwrap();
        assert!(matches!(live, WatchEvent::Modified(ref e) if e.metadata.name == "a"));
    }

    #[tokio::test]
    async fn test_watch_from_now_skips_history() {
        let feed = FeedSource::new();
        feed.add(event("a")).unwrap();

        let mut watch = feed.watch("").await.unwrap();
        feed.bookmark();
        assert_eq!(
            watch.next().await.unwrap().unwrap(),
            WatchEvent::Bookmark("1".into())
        );
    }

    #[tokio::test]
    async fn test_compacted_history_expires_old_versions() {
        let feed = FeedSource::with_history_limit(2);
        for name in ["a", "b", "c", "d"] {
            feed.add(event(name)).unwrap();
        }

        // Events 3 and 4 retained; resuming after 2 is fine, after 1 is not
        assert!(feed.watch("2").await.is_ok());
        assert_eq!(feed.watch("1").await.err(), Some(SourceError::Expired));

        feed.compact();
        assert_eq!(feed.watch("3").await.err(), Some(SourceError::Expired));
        // Current version needs no history
        assert!(feed.watch("4").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_watches_ends_streams() {
        let feed = FeedSource::new();
        let mut watch = feed.watch("").await.unwrap();

        feed.close_watches();
        feed.add(event("a")).unwrap();

        assert!(watch.next().await.is_none());
    }

    #[test]
    fn test_unnamed_object_rejected() {
        let feed = FeedSource::new();
        assert!(feed.add(event("")).is_err());
        assert!(feed.is_empty());
    }
}
