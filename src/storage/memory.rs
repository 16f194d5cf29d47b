// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{RecordStore, StorageError};

pub struct InMemoryStore {
    data: DashMap<String, Value>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current document count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of every stored document
    #[must_use]
    pub fn documents(&self) -> Vec<(String, Value)> {
        self.data
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn put(&self, id: &str, document: Value) -> Result<(), StorageError> {
        self.data.insert(id.to_string(), document);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        store.put("ns/foo", json!({"reason": "Scheduled"})).await.unwrap();

        let doc = store.get("ns/foo").await.unwrap().unwrap();
        assert_eq!(doc["reason"], "Scheduled");
        assert!(store.get("ns/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStore::new();
        store.put("same-id", json!({"version": 1})).await.unwrap();
        store.put("same-id", json!({"version": 2})).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("same-id").await.unwrap().unwrap()["version"], 2);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryStore::new();
        assert!(store.delete("nonexistent").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store
                        .put(&format!("batch-{}-item-{}", batch, i), json!({"i": i}))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
        assert_eq!(store.documents().len(), 100);
    }
}
