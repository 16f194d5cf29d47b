// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Event Relay
//!
//! Watches a collection of cluster objects and relays every observed change
//! to a pluggable backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Notification Source                      │
//! │  • ListWatch: full listing + resumable change stream       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Informer + Synced Cache                    │
//! │  • DashMap keyed by namespace/name                         │
//! │  • Relist on expiry, tombstones for missed deletes         │
//! │  • add / update / delete callbacks → EventRecord           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Rate-Limiting Work Queue                    │
//! │  • Coalesces identical pending records                     │
//! │  • Never hands one record to two workers                   │
//! │  • Per-record exponential backoff on retry                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (N worker tasks)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Backend Handlers                        │
//! │  • local (log line) / cloudant (document) / aurora (row)   │
//! │  • Selected per record from the live config                │
//! │  • 5 retries, then dropped and reported                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use event_relay::{
//!     ClusterEvent, Controller, FeedSource, HandlerRegistry, Informer, ObjectMeta,
//!     RelayConfig, RetryConfig,
//! };
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let feed = Arc::new(FeedSource::<ClusterEvent>::new());
//!     let informer = Arc::new(Informer::new(feed.clone(), RetryConfig::watch()));
//!
//!     let (_config_tx, config_rx) = watch::channel(RelayConfig::from_env());
//!     let controller = Arc::new(Controller::new(
//!         informer,
//!         Arc::new(HandlerRegistry::local_only().await.unwrap()),
//!         config_rx,
//!     ));
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let running = tokio::spawn(controller.run(shutdown_rx));
//!
//!     feed.add(
//!         ClusterEvent::new(ObjectMeta::namespaced("ns", "foo"))
//!             .with_reason("Scheduled", "Successfully assigned ns/foo"),
//!     )
//!     .unwrap();
//!
//!     shutdown_tx.send_replace(true);
//!     running.await.unwrap().unwrap();
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`RelayConfig`] for all configuration options. `BACKENDHANDLERTYPE`
//! selects the backend.
//!
//! ## Modules
//!
//! - [`controller`]: The [`Controller`] running informer and workers
//! - [`cache`]: Informer, synced cache, and the in-process [`FeedSource`]
//! - [`queue`]: Deduplicating work queue and rate limiters
//! - [`handlers`]: Backend handlers and their registry
//! - [`storage`]: Record stores behind the cloudant and aurora handlers
//! - [`resilience`]: Retry with backoff for the notification source

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_record;
pub mod handlers;
pub mod metrics;
pub mod queue;
pub mod reporter;
pub mod resilience;
pub mod resource;
pub mod storage;

pub use cache::{
    FeedSource, Informer, ListWatch, ObjectList, ResourceEventHandler, SourceError, SyncedCache, WatchEvent,
    WatchStream,
};
pub use config::RelayConfig;
pub use controller::{Controller, ControllerState};
pub use error::RelayError;
pub use event_record::{EventRecord, EventType};
pub use handlers::{AuroraHandler, BackendTypes, CloudantHandler, Handler, HandlerError, HandlerRegistry, LocalHandler};
pub use metrics::LatencyTimer;
pub use queue::{RateLimitingQueue, WorkQueue};
pub use reporter::{ErrorReporter, LoggingErrorReporter};
pub use resilience::retry::RetryConfig;
pub use resource::{
    deletion_handling_key, meta_namespace_key, ClusterEvent, DeletedFinalStateUnknown, DeletedObject,
    KeyError, ObjectMeta, ObjectReference, Resource,
};
pub use storage::{InMemoryStore, RecordStore, StorageError};
