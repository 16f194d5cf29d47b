// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A keyed JSON store a backend handler writes relayed records into.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Verify the store is reachable. Called from handler `init`.
    async fn ping(&self) -> Result<(), StorageError>;

    async fn get(&self, id: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or overwrite the document stored under `id`.
    async fn put(&self, id: &str, document: Value) -> Result<(), StorageError>;

    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;
}
