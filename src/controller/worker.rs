// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Worker loop: dequeue, relay, and apply the retry policy.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, warn};

use super::Controller;
use crate::error::RelayError;
use crate::event_record::{EventRecord, EventType};
use crate::handlers::{BackendTypes, Handler};
use crate::metrics::LatencyTimer;
use crate::queue::RateLimitingQueue;
use crate::resource::Resource;

/// Marks a record done on drop, however processing ended.
struct DoneGuard<'a> {
    queue: &'a RateLimitingQueue<EventRecord>,
    record: &'a EventRecord,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.record);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<K: Resource> Controller<K> {
    pub(super) async fn run_worker(&self, worker_id: usize) {
        debug!(worker_id, "Worker started");
        while self.process_next_item().await {}
        debug!(worker_id, "Worker stopped");
    }

    /// Handle one record. Returns false once the queue is shut down and empty.
    pub(super) async fn process_next_item(&self) -> bool {
        let Some(record) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.queue,
            record: &record,
        };

        // Resolved once, so metrics name the backend that actually ran
        let configured = self.config_rx.borrow().backend;
        let handler = self.handlers.resolve(configured);
        let backend = handler.backend_type();

        let result = AssertUnwindSafe(self.process_item(&record, handler.as_ref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                crate::metrics::record_worker_panic();
                Err(RelayError::WorkerPanic {
                    key: record.key().to_string(),
                    message: panic_message(panic.as_ref()),
                })
            });

        self.handle_result(&record, backend, result);
        crate::metrics::set_queue_depth(self.queue.len());
        true
    }

    /// Relay `record` through `handler`.
    async fn process_item(&self, record: &EventRecord, handler: &dyn Handler) -> Result<(), RelayError> {
        // The informer drops deleted objects before notifying
        if record.event_type != EventType::Delete && !self.informer.cache().contains_key(record.key()) {
            return Err(RelayError::CacheMiss {
                key: record.key().to_string(),
            });
        }

        let backend = handler.backend_type();
        let _timer = LatencyTimer::new(backend.as_str());
        match handler.relay(record).await {
            Ok(()) => {
                crate::metrics::record_relay(backend.as_str(), "success");
                Ok(())
            }
            Err(source) => {
                crate::metrics::record_relay(backend.as_str(), "error");
                Err(RelayError::Relay {
                    key: record.key().to_string(),
                    backend,
                    source,
                })
            }
        }
    }

    /// Forget on success; otherwise retry with backoff until `max_retries`
    /// requeues, then drop and report.
    fn handle_result(&self, record: &EventRecord, backend: BackendTypes, result: Result<(), RelayError>) {
        let err = match result {
            Ok(()) => {
                self.queue.forget(record);
                return;
            }
            Err(err) => err,
        };

        let max_retries = self.config_rx.borrow().max_retries;
        let requeues = self.queue.num_requeues(record);

        if requeues < max_retries {
            warn!(
                key = %record.key(),
                attempt = requeues + 1,
                max_retries,
                error = %err,
                "Error processing record (will retry)"
            );
            crate::metrics::record_retry(backend.as_str());
            self.queue.add_rate_limited(record.clone());
        } else {
            error!(key = %record.key(), error = %err, "Error processing record (giving up)");
            self.queue.forget(record);
            crate::metrics::record_dropped(backend.as_str());
            self.reporter.report(&RelayError::RetriesExhausted {
                key: record.key().to_string(),
                attempts: requeues + 1,
                source: Box::new(err),
            });
        }
    }
}
