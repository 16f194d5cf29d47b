// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Watched resource model.
//!
//! The pipeline is generic over the kind of object it watches. Every kind
//! implements [`Resource`], which exposes its [`ObjectMeta`] and copies any
//! kind-specific fields into an [`EventRecord`].
//!
//! Objects are identified by a composite key: `namespace/name` for namespaced
//! objects, plain `name` for cluster-scoped ones.
//!
//! # Example
//!
//! ```
//! use event_relay::{ClusterEvent, ObjectMeta, meta_namespace_key};
//!
//! let event = ClusterEvent::new(ObjectMeta::namespaced("ns", "foo"));
//! assert_eq!(meta_namespace_key(&event).unwrap(), "ns/foo");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_record::EventRecord;

/// Failure to derive a cache key from an object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("object of kind {kind} has no name")]
    MissingName { kind: &'static str },
    #[error("record key is empty")]
    EmptyKey,
}

/// Identity and versioning metadata carried by every watched object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    #[must_use]
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            resource_version: None,
        }
    }

    #[must_use]
    pub fn cluster_scoped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            resource_version: None,
        }
    }
}

/// A kind of object the pipeline can watch.
pub trait Resource: Clone + Send + Sync + 'static {
    /// Tag written into [`EventRecord::resource_type`].
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Copy kind-specific fields into a record built for this object.
    fn populate(&self, _record: &mut EventRecord) {}
}

/// Derive the `namespace/name` key of an object.
///
/// Cluster-scoped objects (no namespace, or an empty one) are keyed by name.
pub fn meta_namespace_key<K: Resource>(obj: &K) -> Result<String, KeyError> {
    let meta = obj.metadata();
    if meta.name.is_empty() {
        return Err(KeyError::MissingName { kind: K::KIND });
    }
    match meta.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Ok(format!("{}/{}", ns, meta.name)),
        _ => Ok(meta.name.clone()),
    }
}

/// Final state of an object whose deletion was only noticed by relisting.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedFinalStateUnknown<K> {
    pub key: String,
    pub obj: K,
}

/// Payload of a delete notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletedObject<K> {
    /// The object as observed at deletion.
    Object(K),
    /// The last known state; the object may have changed before it went away.
    Tombstone(DeletedFinalStateUnknown<K>),
}

impl<K: Resource> DeletedObject<K> {
    /// The last known object, whichever form the notification took.
    pub fn object(&self) -> &K {
        match self {
            Self::Object(obj) => obj,
            Self::Tombstone(tombstone) => &tombstone.obj,
        }
    }
}

/// Like [`meta_namespace_key`], but tombstones answer with the key they were
/// recorded under.
pub fn deletion_handling_key<K: Resource>(deleted: &DeletedObject<K>) -> Result<String, KeyError> {
    match deleted {
        DeletedObject::Tombstone(tombstone) => Ok(tombstone.key.clone()),
        DeletedObject::Object(obj) => meta_namespace_key(obj),
    }
}

/// Reference to the object a [`ClusterEvent`] is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
}

/// A cluster event: the resource kind the relay watches by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub involved_object: ObjectReference,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Epoch millis
    #[serde(default)]
    pub first_timestamp: Option<i64>,
    /// Epoch millis
    #[serde(default)]
    pub last_timestamp: Option<i64>,
    /// `Normal` or `Warning`
    #[serde(default, rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub count: u32,
}

impl ClusterEvent {
    #[must_use]
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: &str, message: &str) -> Self {
        self.reason = reason.to_string();
        self.message = message.to_string();
        self
    }

    #[must_use]
    pub fn with_timestamps(mut self, first: i64, last: i64) -> Self {
        self.first_timestamp = Some(first);
        self.last_timestamp = Some(last);
        self
    }
}

impl Resource for ClusterEvent {
    const KIND: &'static str = "event";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn populate(&self, record: &mut EventRecord) {
        record.reason = self.reason.clone();
        record.message = self.message.clone();
        record.first_timestamp = self.first_timestamp;
        record.last_timestamp = self.last_timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        let event = ClusterEvent::new(ObjectMeta::namespaced("kube-system", "coredns.17a"));
        assert_eq!(meta_namespace_key(&event).unwrap(), "kube-system/coredns.17a");
    }

    #[test]
    fn test_cluster_scoped_key() {
        let event = ClusterEvent::new(ObjectMeta::cluster_scoped("node-1.17a"));
        assert_eq!(meta_namespace_key(&event).unwrap(), "node-1.17a");

        let mut empty_ns = ClusterEvent::new(ObjectMeta::cluster_scoped("node-2"));
        empty_ns.metadata.namespace = Some(String::new());
        assert_eq!(meta_namespace_key(&empty_ns).unwrap(), "node-2");
    }

    #[test]
    fn test_missing_name_is_error() {
        let event = ClusterEvent::new(ObjectMeta::namespaced("ns", ""));
        assert_eq!(
            meta_namespace_key(&event),
            Err(KeyError::MissingName { kind: "event" })
        );
    }

    #[test]
    fn test_tombstone_key_wins() {
        // The stored key is authoritative even if the object is unnamed
        let tombstone = DeletedObject::Tombstone(DeletedFinalStateUnknown {
            key: "ns/gone".to_string(),
            obj: ClusterEvent::default(),
        });
        assert_eq!(deletion_handling_key(&tombstone).unwrap(), "ns/gone");

        let direct = DeletedObject::Object(ClusterEvent::new(ObjectMeta::namespaced("ns", "bar")));
        assert_eq!(deletion_handling_key(&direct).unwrap(), "ns/bar");
        assert_eq!(direct.object().metadata.name, "bar");
    }

    #[test]
    fn test_cluster_event_deserializes_type_field() {
        let event: ClusterEvent = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "pod.1", "namespace": "ns", "resource_version": "42"},
            "reason": "BackOff",
            "message": "Back-off restarting failed container",
            "type": "Warning",
            "count": 3
        }))
        .unwrap();

        assert_eq!(event.event_type, "Warning");
        assert_eq!(event.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(event.count, 3);
        assert!(event.first_timestamp.is_none());
    }
}
