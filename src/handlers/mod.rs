// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend handlers.
//!
//! A [`Handler`] is the only way a record leaves the pipeline. Each backend
//! kind in [`BackendTypes`] has one implementation:
//!
//! | Backend    | Handler             | Effect                                   |
//! |------------|---------------------|------------------------------------------|
//! | `local`    | [`LocalHandler`]    | one structured log line per record       |
//! | `cloudant` | [`CloudantHandler`] | one JSON document per record             |
//! | `aurora`   | [`AuroraHandler`]   | one row per key, holding the last record |
//!
//! Handlers are bound once into a [`HandlerRegistry`], which initializes
//! them. Workers resolve a handler per dispatch from the configured backend.

mod aurora;
mod cloudant;
mod local;

pub use aurora::AuroraHandler;
pub use cloudant::CloudantHandler;
pub use local::LocalHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::event_record::EventRecord;
use crate::storage::StorageError;

/// Backend kinds a record can be relayed to.
///
/// Parsing never fails: anything unrecognized selects `Local`.
///
/// ```
/// use event_relay::BackendTypes;
///
/// assert_eq!(BackendTypes::from("cloudant"), BackendTypes::Cloudant);
/// assert_eq!(BackendTypes::from(" Aurora "), BackendTypes::Aurora);
/// assert_eq!(BackendTypes::from("kafka"), BackendTypes::Local);
/// assert_eq!(BackendTypes::from(""), BackendTypes::Local);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum BackendTypes {
    #[default]
    Local,
    Cloudant,
    Aurora,
}

impl BackendTypes {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloudant => "cloudant",
            Self::Aurora => "aurora",
        }
    }
}

impl From<&str> for BackendTypes {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloudant" => Self::Cloudant,
            "aurora" => Self::Aurora,
            _ => Self::Local,
        }
    }
}

impl From<String> for BackendTypes {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl std::fmt::Display for BackendTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{backend} handler used before init")]
    NotInitialized { backend: BackendTypes },
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{backend} store error: {source}")]
    Storage {
        backend: BackendTypes,
        #[source]
        source: StorageError,
    },
    #[error("backend rejected record: {0}")]
    Rejected(String),
}

/// A backend that accepts finalized records.
///
/// Shared by every worker, so `relay` may run concurrently.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Connection and credential setup. Called once, before any `relay`.
    async fn init(&self) -> Result<(), HandlerError>;

    fn backend_type(&self) -> BackendTypes;

    async fn relay(&self, record: &EventRecord) -> Result<(), HandlerError>;
}

/// One initialized handler per backend kind.
///
/// Always holds a `local` handler, which answers for any backend that was
/// not registered.
pub struct HandlerRegistry {
    handlers: HashMap<BackendTypes, Arc<dyn Handler>>,
    local: Arc<dyn Handler>,
}

impl HandlerRegistry {
    /// Registry with only the log handler.
    pub async fn local_only() -> Result<Self, HandlerError> {
        Self::build(Vec::new()).await
    }

    /// Initialize each handler once and bind it to its backend kind.
    ///
    /// A later handler for the same backend replaces an earlier one. Without
    /// a `local` handler in `handlers`, a [`LocalHandler`] is created and
    /// initialized as well.
    pub async fn build(handlers: Vec<Arc<dyn Handler>>) -> Result<Self, HandlerError> {
        let mut bound: HashMap<BackendTypes, Arc<dyn Handler>> = HashMap::new();
        for handler in handlers {
            let backend = handler.backend_type();
            handler.init().await?;
            info!(backend = %backend, "Backend handler initialized");
            if bound.insert(backend, handler).is_some() {
                warn!(backend = %backend, "Replaced previously registered handler");
            }
        }

        let local = match bound.get(&BackendTypes::Local) {
            Some(local) => local.clone(),
            None => {
                let local: Arc<dyn Handler> = Arc::new(LocalHandler::new());
                local.init().await?;
                bound.insert(BackendTypes::Local, local.clone());
                local
            }
        };
        Ok(Self { handlers: bound, local })
    }

    /// Handler bound to `backend`, or the local handler.
    #[must_use]
    pub fn resolve(&self, backend: BackendTypes) -> Arc<dyn Handler> {
        self.handlers
            .get(&backend)
            .cloned()
            .unwrap_or_else(|| self.local.clone())
    }

    #[must_use]
    pub fn contains(&self, backend: BackendTypes) -> bool {
        self.handlers.contains_key(&backend)
    }
}
