// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document-store backend.
//!
//! Every relayed record becomes a new document, so the store keeps the full
//! history of changes for each key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{BackendTypes, Handler, HandlerError};
use crate::event_record::EventRecord;
use crate::storage::RecordStore;

/// Document type tag written on every relayed record.
pub const DOCUMENT_TYPE: &str = "relay_event";

pub struct CloudantHandler {
    store: Arc<dyn RecordStore>,
    initialized: AtomicBool,
}

impl CloudantHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            initialized: AtomicBool::new(false),
        }
    }

    fn storage_error(source: crate::storage::StorageError) -> HandlerError {
        HandlerError::Storage {
            backend: BackendTypes::Cloudant,
            source,
        }
    }
}

#[async_trait]
impl Handler for CloudantHandler {
    async fn init(&self) -> Result<(), HandlerError> {
        self.store.ping().await.map_err(Self::storage_error)?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_type(&self) -> BackendTypes {
        BackendTypes::Cloudant
    }

    async fn relay(&self, record: &EventRecord) -> Result<(), HandlerError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(HandlerError::NotInitialized {
                backend: BackendTypes::Cloudant,
            });
        }

        let doc_id = uuid::Uuid::new_v4().to_string();
        let mut document = record.to_json()?;
        if let Value::Object(ref mut fields) = document {
            fields.insert("_id".into(), Value::String(doc_id.clone()));
            fields.insert("type".into(), Value::String(DOCUMENT_TYPE.into()));
        }

        self.store
            .put(&doc_id, document)
            .await
            .map_err(Self::storage_error)?;
        debug!(key = %record.key(), doc_id = %doc_id, "Stored relay document");
        Ok(())
    }
}
