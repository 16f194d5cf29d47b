// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for event-relay.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `event_relay_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `kind`: watched resource kind (e.g. `event`)
//! - `event_type`: create, update, delete
//! - `backend`: local, cloudant, aurora
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::event_record::EventType;

// ═══════════════════════════════════════════════════════════════════════════
// CACHE - Notifications and informer health
// ═══════════════════════════════════════════════════════════════════════════

/// Record a notification that was turned into a queued record
pub fn record_notification(kind: &'static str, event_type: EventType) {
    counter!(
        "event_relay_notifications_total",
        "kind" => kind,
        "event_type" => event_type.as_str()
    )
    .increment(1);
}

/// Record a notification dropped because no key could be derived
pub fn record_notification_dropped(kind: &'static str, event_type: EventType) {
    counter!(
        "event_relay_notifications_dropped_total",
        "kind" => kind,
        "event_type" => event_type.as_str()
    )
    .increment(1);
}

/// Set the number of objects held by the cache
pub fn set_cache_objects(kind: &'static str, count: usize) {
    gauge!("event_relay_cache_objects", "kind" => kind).set(count as f64);
}

/// Record the outcome of the initial cache sync
pub fn record_cache_sync(status: &'static str, duration: Duration) {
    counter!("event_relay_cache_sync_total", "status" => status).increment(1);
    histogram!("event_relay_cache_sync_seconds").record(duration.as_secs_f64());
}

/// Record a watch being re-established (`expired`, `error`, `closed`)
pub fn record_watch_restart(kind: &'static str, reason: &'static str) {
    counter!(
        "event_relay_watch_restarts_total",
        "kind" => kind,
        "reason" => reason
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// QUEUE + WORKERS
// ═══════════════════════════════════════════════════════════════════════════

/// Set current work queue depth
pub fn set_queue_depth(depth: usize) {
    gauge!("event_relay_queue_depth").set(depth as f64);
}

/// Record one relay attempt against a backend
pub fn record_relay(backend: &'static str, status: &'static str) {
    counter!(
        "event_relay_relays_total",
        "backend" => backend,
        "status" => status
    )
    .increment(1);
}

/// Record relay latency
pub fn record_relay_latency(backend: &'static str, duration: Duration) {
    histogram!("event_relay_relay_seconds", "backend" => backend).record(duration.as_secs_f64());
}

/// Record a failed record being scheduled for another attempt
pub fn record_retry(backend: &'static str) {
    counter!("event_relay_retries_total", "backend" => backend).increment(1);
}

/// Record a record dropped after exhausting its retries
pub fn record_dropped(backend: &'static str) {
    counter!("event_relay_dropped_total", "backend" => backend).increment(1);
}

/// Record a panic caught at the worker loop boundary
pub fn record_worker_panic() {
    counter!("event_relay_worker_panics_total").increment(1);
}

/// Record an error handed to the error reporter
pub fn record_error_reported(error: &'static str) {
    counter!("event_relay_errors_reported_total", "error" => error).increment(1);
}

/// Set controller state (for monitoring state machine transitions)
pub fn set_controller_state(state: &str) {
    counter!(
        "event_relay_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// A timing guard that records relay latency on drop
pub struct LatencyTimer {
    backend: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_relay_latency(self.backend, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Most of these only verify the calls don't panic without a recorder.

    #[test]
    fn test_cache_metrics() {
        record_notification("event", EventType::Create);
        record_notification_dropped("event", EventType::Delete);
        set_cache_objects("event", 12);
        record_cache_sync("success", Duration::from_millis(40));
        record_watch_restart("event", "expired");
    }

    #[test]
    fn test_worker_metrics() {
        set_queue_depth(3);
        record_relay("local", "success");
        record_relay("aurora", "error");
        record_retry("aurora");
        record_dropped("aurora");
        record_worker_panic();
        record_error_reported("retries_exhausted");
        set_controller_state("Ready");
    }

    #[test]
    fn test_relay_counter_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_relay("cloudant", "success");
            record_relay("cloudant", "success");
            let _timer = LatencyTimer::new("cloudant");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let relays = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "event_relay_relays_total")
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(relays, Some(&DebugValue::Counter(2)));

        assert!(snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "event_relay_relay_seconds"));
    }
}
