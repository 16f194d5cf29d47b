// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chaos Testing for the event relay
//!
//! This module tests failure scenarios using:
//! 1. **FailingHandler** - precise error injection at specific call counts
//! 2. **PanickingHandler** - handlers that blow up mid-relay
//! 3. **FlakySource** - a notification source that drops lists and watches
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use event_relay::{
    BackendTypes, ClusterEvent, Controller, ControllerState, ErrorReporter, EventRecord, FeedSource,
    Handler, HandlerError, HandlerRegistry, Informer, ListWatch, ObjectList, ObjectMeta, RelayConfig,
    RelayError, RetryConfig, SourceError, WatchStream,
};

// =============================================================================
// Failure Injection
// =============================================================================

/// Fails the first `fail_first` relays, then succeeds. Records call times.
struct FailingHandler {
    fail_first: u64,
    calls: AtomicU64,
    call_times: Mutex<Vec<Instant>>,
}

impl FailingHandler {
    fn new(fail_first: u64) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            calls: AtomicU64::new(0),
            call_times: Mutex::new(Vec::new()),
        })
    }

    fn always() -> Arc<Self> {
        Self::new(u64::MAX)
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gaps(&self) -> Vec<Duration> {
        let times = self.call_times.lock();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Handler for FailingHandler {
    async fn init(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn backend_type(&self) -> BackendTypes {
        BackendTypes::Aurora
    }

    async fn relay(&self, _record: &EventRecord) -> Result<(), HandlerError> {
        self.call_times.lock().push(Instant::now());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            Err(HandlerError::Rejected(format!("injected failure {}", call)))
        } else {
            Ok(())
        }
    }
}

/// Panics on records for one key, relays the rest.
struct PanickingHandler {
    poison_key: &'static str,
    relayed: AtomicUsize,
}

#[async_trait]
impl Handler for PanickingHandler {
    async fn init(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn backend_type(&self) -> BackendTypes {
        BackendTypes::Cloudant
    }

    async fn relay(&self, record: &EventRecord) -> Result<(), HandlerError> {
        if record.key() == self.poison_key {
            panic!("poisoned record {}", record.key());
        }
        self.relayed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails the first `list_failures` lists and ends every watch after one event.
struct FlakySource {
    inner: FeedSource<ClusterEvent>,
    list_failures: AtomicUsize,
    lists: AtomicUsize,
}

#[async_trait]
impl ListWatch<ClusterEvent> for FlakySource {
    async fn list(&self) -> Result<ObjectList<ClusterEvent>, SourceError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::Transport("connection refused".into()));
        }
        self.inner.list().await
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream<ClusterEvent>, SourceError> {
        use futures::StreamExt;
        Ok(self.inner.watch(resource_version).await?.take(1).boxed())
    }
}

#[derive(Default)]
struct CollectingReporter {
    errors: Mutex<Vec<String>>,
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, err: &RelayError) {
        self.errors.lock().push(err.to_string());
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn event(name: &str) -> ClusterEvent {
    ClusterEvent::new(ObjectMeta::namespaced("ns", name))
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn start(
    source: Arc<dyn ListWatch<ClusterEvent>>,
    handler: Arc<dyn Handler>,
    config: RelayConfig,
    reporter: Arc<CollectingReporter>,
) -> (
    Arc<Controller<ClusterEvent>>,
    watch::Sender<bool>,
    tokio::task::JoinHandle<Result<(), RelayError>>,
) {
    let informer = Arc::new(Informer::new(source, RetryConfig::fast()));
    let registry = HandlerRegistry::build(vec![handler]).await.unwrap();
    let (_, config_rx) = watch::channel(config);
    let controller = Arc::new(Controller::new(informer, Arc::new(registry), config_rx).with_reporter(reporter));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(controller.clone().run(shutdown_rx));

    let mut states = controller.state_receiver();
    tokio::time::timeout(
        Duration::from_secs(10),
        states.wait_for(|s| *s == ControllerState::Ready),
    )
    .await
    .expect("controller never became ready")
    .unwrap();

    (controller, shutdown_tx, task)
}

fn config(backend: BackendTypes) -> RelayConfig {
    RelayConfig {
        backend,
        retry_base_delay_ms: 5,
        retry_max_delay_ms: 1_000,
        ..Default::default()
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

#[tokio::test]
async fn chaos_always_failing_handler_gives_up_after_five_retries() {
    let feed = Arc::new(FeedSource::<ClusterEvent>::new());
    let handler = FailingHandler::always();
    let reporter = Arc::new(CollectingReporter::default());
    let (_controller, shutdown_tx, task) =
        start(feed.clone(), handler.clone(), config(BackendTypes::Aurora), reporter.clone()).await;

    feed.add(event("baz")).unwrap();
    wait_until("error reported", || !reporter.errors.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // One initial attempt plus five retries, then dropped
    assert_eq!(handler.calls(), 6);

    // 5ms, 10ms, 20ms, 40ms, 80ms
    let gaps = handler.gaps();
    assert_eq!(gaps.len(), 5);
    for (i, gap) in gaps.iter().enumerate() {
        let expected = Duration::from_millis(5 << i);
        assert!(*gap >= expected, "retry {} came after {:?}, expected at least {:?}", i + 1, gap, expected);
    }
    assert!(gaps[4] > gaps[0]);

    let errors = reporter.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("ns/baz"));
    assert!(errors[0].contains("injected failure 6"));

    shutdown_tx.send_replace(true);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn chaos_transient_failures_recover_without_report() {
    for fail_first in 1..5u64 {
        let feed = Arc::new(FeedSource::<ClusterEvent>::new());
        let handler = FailingHandler::new(fail_first);
        let reporter = Arc::new(CollectingReporter::default());
        let (controller, shutdown_tx, task) =
            start(feed.clone(), handler.clone(), config(BackendTypes::Aurora), reporter.clone()).await;

        feed.add(event("flaky")).unwrap();
        wait_until("eventual success", || handler.calls() == fail_first + 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handler.calls(), fail_first + 1, "failing {} times", fail_first);
        assert!(reporter.errors.lock().is_empty());
        assert_eq!(controller.queue_len(), 0);

        shutdown_tx.send_replace(true);
        task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn chaos_max_retries_is_configurable() {
    let feed = Arc::new(FeedSource::<ClusterEvent>::new());
    let handler = FailingHandler::always();
    let reporter = Arc::new(CollectingReporter::default());
    let config = RelayConfig {
        max_retries: 1,
        ..config(BackendTypes::Aurora)
    };
    let (_controller, shutdown_tx, task) = start(feed.clone(), handler.clone(), config, reporter.clone()).await;

    feed.add(event("baz")).unwrap();
    wait_until("error reported", || !reporter.errors.lock().is_empty()).await;
    assert_eq!(handler.calls(), 2);
    assert!(reporter.errors.lock()[0].contains("2 attempts"));

    shutdown_tx.send_replace(true);
    task.await.unwrap().unwrap();
}

// =============================================================================
// Panics
// =============================================================================

#[tokio::test]
async fn chaos_panicking_handler_does_not_kill_worker() {
    let feed = Arc::new(FeedSource::<ClusterEvent>::new());
    let handler = Arc::new(PanickingHandler {
        poison_key: "ns/poison",
        relayed: AtomicUsize::new(0),
    });
    let reporter = Arc::new(CollectingReporter::default());
    let config = RelayConfig {
        retry_base_delay_ms: 1,
        ..config(BackendTypes::Cloudant)
    };
    let (controller, shutdown_tx, task) = start(feed.clone(), handler.clone(), config, reporter.clone()).await;

    feed.add(event("poison")).unwrap();
    feed.add(event("healthy")).unwrap();

    wait_until("poison given up", || !reporter.errors.lock().is_empty()).await;
    wait_until("healthy relayed", || handler.relayed.load(Ordering::SeqCst) == 1).await;

    // Still serving after six panics
    feed.add(event("after")).unwrap();
    wait_until("later record relayed", || handler.relayed.load(Ordering::SeqCst) == 2).await;

    let errors = reporter.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("ns/poison"));
    assert!(errors[0].contains("panicked"));
    assert_eq!(controller.state(), ControllerState::Ready);

    shutdown_tx.send_replace(true);
    task.await.unwrap().unwrap();
}

// =============================================================================
// Source Failures
// =============================================================================

#[tokio::test]
async fn chaos_source_failures_are_retried() {
    let inner = FeedSource::new();
    inner.add(event("before")).unwrap();
    let source = Arc::new(FlakySource {
        inner,
        list_failures: AtomicUsize::new(3),
        lists: AtomicUsize::new(0),
    });
    let handler = FailingHandler::new(0);
    let reporter = Arc::new(CollectingReporter::default());

    let (controller, shutdown_tx, task) =
        start(source.clone(), handler.clone(), config(BackendTypes::Aurora), reporter.clone()).await;
    assert!(source.lists.load(Ordering::SeqCst) >= 4);
    assert!(controller.has_synced());

    // Every watch ends after one event; nothing may be lost across re-watches
    for name in ["one", "two", "three"] {
        source.inner.add(event(name)).unwrap();
    }
    wait_until("all relayed", || handler.calls() == 4).await;
    wait_until("cache caught up", || controller.cache().len() == 4).await;
    assert!(reporter.errors.lock().is_empty());

    shutdown_tx.send_replace(true);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn chaos_multiple_workers_relay_each_record_once() {
    let feed = Arc::new(FeedSource::<ClusterEvent>::new());
    let handler = FailingHandler::new(0);
    let reporter = Arc::new(CollectingReporter::default());
    let config = RelayConfig {
        workers: 4,
        ..config(BackendTypes::Aurora)
    };
    let (_controller, shutdown_tx, task) = start(feed.clone(), handler.clone(), config, reporter.clone()).await;

    for i in 0..50 {
        feed.add(event(&format!("pod-{}", i))).unwrap();
    }
    wait_until("all relayed", || handler.calls() == 50).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.calls(), 50);

    shutdown_tx.send_replace(true);
    task.await.unwrap().unwrap();
}
