// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational backend: one row per object key, holding its latest change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{BackendTypes, Handler, HandlerError};
use crate::event_record::EventRecord;
use crate::storage::RecordStore;

pub struct AuroraHandler {
    store: Arc<dyn RecordStore>,
    initialized: AtomicBool,
}

impl AuroraHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            initialized: AtomicBool::new(false),
        }
    }

    fn row(record: &EventRecord) -> Value {
        let relayed_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        json!({
            "event_key": record.key(),
            "event_type": record.event_type.as_str(),
            "namespace": record.namespace,
            "resource_type": record.resource_type,
            "reason": record.reason,
            "message": record.message,
            "first_timestamp": record.first_timestamp,
            "last_timestamp": record.last_timestamp,
            "relayed_at": relayed_at,
        })
    }
}

#[async_trait]
impl Handler for AuroraHandler {
    async fn init(&self) -> Result<(), HandlerError> {
        self.store.ping().await.map_err(|source| HandlerError::Storage {
            backend: BackendTypes::Aurora,
            source,
        })?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_type(&self) -> BackendTypes {
        BackendTypes::Aurora
    }

    async fn relay(&self, record: &EventRecord) -> Result<(), HandlerError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(HandlerError::NotInitialized {
                backend: BackendTypes::Aurora,
            });
        }

        self.store
            .put(record.key(), Self::row(record))
            .await
            .map_err(|source| HandlerError::Storage {
                backend: BackendTypes::Aurora,
                source,
            })?;
        debug!(key = %record.key(), "Upserted relay row");
        Ok(())
    }
}
