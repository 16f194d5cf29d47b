// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relay controller.
//!
//! The [`Controller`] ties the pipeline together:
//! - an [`Informer`] keeping the cache in sync and feeding the queue
//! - a [`RateLimitingQueue`] of [`EventRecord`]s
//! - worker tasks relaying records through the [`HandlerRegistry`]
//! - an [`ErrorReporter`] for errors that cannot be retried away
//!
//! # Lifecycle
//!
//! ```text
//! Initializing → Syncing → Ready → Draining → Stopped
//!                   │                            ▲
//!                   └──── sync timeout ──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use event_relay::{
//!     ClusterEvent, Controller, ControllerState, FeedSource, HandlerRegistry, Informer,
//!     RelayConfig, RetryConfig,
//! };
//! use tokio::sync::watch;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let feed = Arc::new(FeedSource::<ClusterEvent>::new());
//! let informer = Arc::new(Informer::new(feed, RetryConfig::watch()));
//! let (_config_tx, config_rx) = watch::channel(RelayConfig::from_env());
//! let controller = Arc::new(Controller::new(
//!     informer,
//!     Arc::new(HandlerRegistry::local_only().await.unwrap()),
//!     config_rx,
//! ));
//! assert_eq!(controller.state(), ControllerState::Initializing);
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let running = tokio::spawn(controller.clone().run(shutdown_rx));
//! // ...
//! shutdown_tx.send_replace(true);
//! running.await.unwrap().unwrap();
//! # }
//! ```

mod lifecycle;
mod types;
mod worker;

pub use types::ControllerState;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::cache::{Informer, QueueingEventHandler, SyncedCache};
use crate::config::RelayConfig;
use crate::event_record::EventRecord;
use crate::handlers::HandlerRegistry;
use crate::queue::{default_controller_rate_limiter, RateLimitingQueue};
use crate::reporter::{ErrorReporter, LoggingErrorReporter};
use crate::resource::Resource;

/// Reconciles cache notifications into backend relays.
///
/// Shared as `Arc<Controller<K>>`: [`Controller::run`] consumes one clone,
/// the rest can query state concurrently.
pub struct Controller<K: Resource> {
    /// Runtime config; backend and retry limit are read per record
    pub(super) config_rx: watch::Receiver<RelayConfig>,

    pub(super) state: watch::Sender<ControllerState>,
    pub(super) state_rx: watch::Receiver<ControllerState>,

    pub(super) queue: RateLimitingQueue<EventRecord>,
    pub(super) informer: Arc<Informer<K>>,
    pub(super) handlers: Arc<HandlerRegistry>,
    pub(super) reporter: Arc<dyn ErrorReporter>,
}

impl<K: Resource> Controller<K> {
    /// Create a controller and register its queueing callbacks on `informer`.
    ///
    /// The queue's backoff comes from the config current at construction.
    pub fn new(
        informer: Arc<Informer<K>>,
        handlers: Arc<HandlerRegistry>,
        config_rx: watch::Receiver<RelayConfig>,
    ) -> Self {
        let limiter = {
            let config = config_rx.borrow();
            default_controller_rate_limiter(
                config.retry_base_delay(),
                config.retry_max_delay(),
                config.overall_qps,
                config.overall_burst,
            )
        };
        let queue: RateLimitingQueue<EventRecord> = RateLimitingQueue::new(limiter);
        informer.add_event_handler(Arc::new(QueueingEventHandler::new(queue.clone())));

        let (state, state_rx) = watch::channel(ControllerState::Initializing);
        info!(kind = K::KIND, "Created relay controller");

        Self {
            config_rx,
            state,
            state_rx,
            queue,
            informer,
            handlers,
            reporter: Arc::new(LoggingErrorReporter),
        }
    }

    /// Replace the default [`LoggingErrorReporter`].
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.informer.has_synced()
    }

    #[must_use]
    pub fn last_sync_resource_version(&self) -> String {
        self.informer.last_sync_resource_version()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<SyncedCache<K>> {
        self.informer.cache()
    }

    /// Records waiting in the queue (not counting delayed retries).
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(super) fn set_state(&self, state: ControllerState) {
        self.state.send_replace(state);
        crate::metrics::set_controller_state(&state.to_string());
        info!(kind = K::KIND, state = %state, "Controller state changed");
    }
}
