// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache callbacks that turn notifications into queued [`EventRecord`]s.

use tracing::{debug, warn};

use super::ResourceEventHandler;
use crate::event_record::{EventRecord, EventType};
use crate::queue::RateLimitingQueue;
use crate::resource::{deletion_handling_key, meta_namespace_key, DeletedObject, KeyError, Resource};

/// Builds a fresh record per notification and enqueues it.
///
/// Objects whose key cannot be derived are logged and dropped.
#[derive(Clone)]
pub struct QueueingEventHandler {
    queue: RateLimitingQueue<EventRecord>,
}

impl QueueingEventHandler {
    pub fn new(queue: RateLimitingQueue<EventRecord>) -> Self {
        Self { queue }
    }

    fn enqueue<K: Resource>(&self, key: Result<String, KeyError>, event_type: EventType, obj: &K) {
        let record = key.and_then(|key| EventRecord::for_object(&key, event_type, obj));
        match record {
            Ok(record) => {
                debug!(key = %record.key(), event_type = %event_type, "Processing {}", event_type);
                crate::metrics::record_notification(K::KIND, event_type);
                self.queue.add(record);
                crate::metrics::set_queue_depth(self.queue.len());
            }
            Err(e) => {
                warn!(kind = K::KIND, event_type = %event_type, error = %e, "Dropping notification for unkeyable object");
                crate::metrics::record_notification_dropped(K::KIND, event_type);
            }
        }
    }
}

impl<K: Resource> ResourceEventHandler<K> for QueueingEventHandler {
    fn on_add(&self, obj: &K) {
        self.enqueue(meta_namespace_key(obj), EventType::Create, obj);
    }

    fn on_update(&self, old: &K, new: &K) {
        // Keyed by the old object, described by the new one
        self.enqueue(meta_namespace_key(old), EventType::Update, new);
    }

    fn on_delete(&self, deleted: &DeletedObject<K>) {
        self.enqueue(deletion_handling_key(deleted), EventType::Delete, deleted.object());
    }
}
