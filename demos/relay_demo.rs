// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! event-relay end-to-end demo.
//!
//! Demonstrates:
//! 1. Building handlers for every backend (document and row stores in memory)
//! 2. Running the controller against an in-process event feed
//! 3. Creating, updating and deleting cluster events
//! 4. Switching backends at runtime through the config channel
//! 5. Displaying metrics (OTEL-compatible)
//! 6. Clean shutdown on Ctrl+C / SIGTERM
//!
//! # Run
//!
//! ```bash
//! BACKENDHANDLERTYPE=local cargo run --example relay_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use event_relay::{
    AuroraHandler, BackendTypes, ClusterEvent, CloudantHandler, Controller, FeedSource, Handler,
    HandlerRegistry, InMemoryStore, Informer, ObjectMeta, RelayConfig, RetryConfig,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║               event-relay: End-to-End Demo                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configuration and handlers
    // ─────────────────────────────────────────────────────────────────────────
    let config = RelayConfig::from_env();
    println!("📦 Backend: {} (workers: {})", config.backend, config.workers);

    let documents = Arc::new(InMemoryStore::new());
    let rows = Arc::new(InMemoryStore::new());
    let handlers: Vec<Arc<dyn Handler>> = vec![
        Arc::new(CloudantHandler::new(documents.clone())),
        Arc::new(AuroraHandler::new(rows.clone())),
    ];
    let registry = Arc::new(HandlerRegistry::build(handlers).await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Controller
    // ─────────────────────────────────────────────────────────────────────────
    let feed = Arc::new(FeedSource::<ClusterEvent>::new());
    feed.add(
        ClusterEvent::new(ObjectMeta::namespaced("kube-system", "coredns.17a"))
            .with_reason("Started", "Started container coredns"),
    )?;

    let informer = Arc::new(Informer::new(feed.clone(), RetryConfig::watch()));
    let (config_tx, config_rx) = watch::channel(config);
    let controller = Arc::new(Controller::new(informer, registry, config_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(controller.clone().run(shutdown_rx));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Produce changes
    // ─────────────────────────────────────────────────────────────────────────
    let producer = {
        let feed = feed.clone();
        tokio::spawn(async move {
            let pod = |reason: &str, message: &str| {
                ClusterEvent::new(ObjectMeta::namespaced("ns", "foo.17b"))
                    .with_reason(reason, message)
            };
            let script = [
                ("Scheduled", "Successfully assigned ns/foo to node-1"),
                ("Pulling", "Pulling image \"nginx:1.27\""),
                ("Pulled", "Successfully pulled image \"nginx:1.27\""),
            ];

            for (i, (reason, message)) in script.iter().enumerate() {
                let result = if i == 0 {
                    feed.add(pod(reason, message))
                } else {
                    feed.update(pod(reason, message))
                };
                if let Err(e) = result {
                    error!(error = %e, "Failed to publish event");
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }

            // 4. Switch backend mid-stream
            config_tx.send_modify(|config| config.backend = BackendTypes::Aurora);
            info!("Switched backend to aurora");
            feed.delete("ns/foo.17b");
            feed.delete("kube-system/coredns.17a");
            config_tx
        })
    };

    println!("\n🚀 Relaying... press Ctrl+C to stop\n");
    wait_for_shutdown().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    shutdown_tx.send_replace(true);
    running.await??;
    let _config_tx = producer.await?;

    println!("\n📍 Stores:");
    println!("   └─ cloudant documents: {}", documents.len());
    println!("   └─ aurora rows: {}", rows.len());

    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    println!("\n✅ Final state: {}", controller.state());
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
                return;
            }
            Err(err) => error!("Failed to listen for SIGTERM: {}", err),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let labels = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{} (counter)", v),
            DebugValue::Gauge(v) => format!("{:.2} (gauge)", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4} (histogram)", count, sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), labels, rendered));
    }

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
