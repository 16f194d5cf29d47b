// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event record data structure.
//!
//! An [`EventRecord`] describes one observed change to a watched object. It is
//! built fresh inside each cache callback, travels through the work queue,
//! and is handed to a backend handler.
//!
//! # Example
//!
//! ```
//! use event_relay::{EventRecord, EventType};
//!
//! let record = EventRecord::new("ns/foo", EventType::Create, "event").unwrap();
//! assert_eq!(record.key(), "ns/foo");
//! assert_eq!(record.event_type.to_string(), "create");
//!
//! // A record without a key can't exist
//! assert!(EventRecord::new("", EventType::Create, "event").is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::resource::{KeyError, Resource};

/// Kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed change, ready to be relayed.
///
/// Equality and hashing cover every field, so the work queue coalesces only
/// identical records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRecord {
    /// Composite `namespace/name` key (never empty)
    key: String,
    pub reason: String,
    pub message: String,
    /// Epoch millis
    pub first_timestamp: Option<i64>,
    /// Epoch millis
    pub last_timestamp: Option<i64>,
    pub event_type: EventType,
    pub namespace: String,
    /// Kind tag of the watched resource (e.g. `event`)
    pub resource_type: String,
}

impl EventRecord {
    /// Create a record with no type-specific fields.
    pub fn new(key: &str, event_type: EventType, resource_type: &str) -> Result<Self, KeyError> {
        if key.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        Ok(Self {
            key: key.to_string(),
            reason: String::new(),
            message: String::new(),
            first_timestamp: None,
            last_timestamp: None,
            event_type,
            namespace: String::new(),
            resource_type: resource_type.to_string(),
        })
    }

    /// Build a record for `obj` under `key`, letting the kind fill in its fields.
    pub fn for_object<K: Resource>(key: &str, event_type: EventType, obj: &K) -> Result<Self, KeyError> {
        let mut record = Self::new(key, event_type, K::KIND)?;
        record.namespace = obj.metadata().namespace.clone().unwrap_or_default();
        obj.populate(&mut record);
        Ok(record)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize to the JSON form handed to backends.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
