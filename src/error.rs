// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors raised by the controller and its workers.

use std::time::Duration;

use thiserror::Error;

use crate::handlers::{BackendTypes, HandlerError};

#[derive(Error, Debug)]
pub enum RelayError {
    /// The cache did not finish its initial listing in time. Fatal to startup.
    #[error("timed out after {timeout:?} waiting for caches to sync")]
    SyncTimeout { timeout: Duration },

    /// A create/update record whose key no longer resolves in the cache.
    #[error("{key} not found in cache")]
    CacheMiss { key: String },

    #[error("{backend} handler failed to relay {key}: {source}")]
    Relay {
        key: String,
        backend: BackendTypes,
        #[source]
        source: HandlerError,
    },

    #[error("worker panicked while relaying {key}: {message}")]
    WorkerPanic { key: String, message: String },

    #[error("dropping {key} out of the queue after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncTimeout { .. } => "sync_timeout",
            Self::CacheMiss { .. } => "cache_miss",
            Self::Relay { .. } => "relay",
            Self::WorkerPanic { .. } => "worker_panic",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// Key of the record the error concerns, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::SyncTimeout { .. } => None,
            Self::CacheMiss { key }
            | Self::Relay { key, .. }
            | Self::WorkerPanic { key, .. }
            | Self::RetriesExhausted { key, .. } => Some(key),
        }
    }
}
