// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Controller lifecycle: sync wait, worker startup, and shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{Controller, ControllerState};
use crate::error::RelayError;
use crate::resource::Resource;

/// Resolves once `shutdown` flips to true or its sender is dropped.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

impl<K: Resource> Controller<K> {
    /// Run the controller until `shutdown` is signalled.
    ///
    /// Startup flow:
    /// 1. Start the informer on its own task
    /// 2. Wait (bounded by `cache_sync_timeout_ms`) for the initial listing
    /// 3. Start `workers` worker tasks
    ///
    /// A sync timeout is reported, stops everything, and is returned. A
    /// shutdown at any point drains and stops cleanly.
    #[tracing::instrument(skip_all, fields(kind = K::KIND))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state != ControllerState::Initializing {
                return false;
            }
            *state = ControllerState::Syncing;
            true
        });
        if !claimed {
            warn!(state = %self.state(), "Controller already started");
            return Ok(());
        }

        info!("Starting controller");
        self.set_state(ControllerState::Syncing);

        let (stop_tx, stop_rx) = watch::channel(false);
        let informer = self.informer.clone();
        let informer_task = tokio::spawn(async move { informer.run(stop_rx).await });

        // ========== Wait for the initial listing ==========
        let (timeout, workers) = {
            let config = self.config_rx.borrow();
            (config.cache_sync_timeout(), config.workers.max(1))
        };
        let sync_start = Instant::now();
        let synced = tokio::select! {
            result = tokio::time::timeout(timeout, self.informer.cache().wait_for_sync()) => result.is_ok(),
            _ = shutdown_requested(&mut shutdown) => {
                info!("Shutdown requested before caches synced");
                self.stop(stop_tx, informer_task, Vec::new()).await;
                return Ok(());
            }
        };

        if !synced {
            crate::metrics::record_cache_sync("timeout", sync_start.elapsed());
            let err = RelayError::SyncTimeout { timeout };
            error!(timeout_ms = timeout.as_millis() as u64, "Timed out waiting for caches to sync");
            self.reporter.report(&err);
            self.stop(stop_tx, informer_task, Vec::new()).await;
            return Err(err);
        }
        crate::metrics::record_cache_sync("success", sync_start.elapsed());
        info!(
            sync_ms = sync_start.elapsed().as_millis() as u64,
            resource_version = %self.last_sync_resource_version(),
            "Controller synced and ready"
        );

        // ========== Relay until shutdown ==========
        self.set_state(ControllerState::Ready);
        let worker_tasks: Vec<_> = (0..workers)
            .map(|worker_id| {
                let controller = self.clone();
                tokio::spawn(async move { controller.run_worker(worker_id).await })
            })
            .collect();
        info!(workers, "Workers started");

        shutdown_requested(&mut shutdown).await;
        info!("Shutdown requested");
        self.stop(stop_tx, informer_task, worker_tasks).await;
        Ok(())
    }

    /// Shut the queue, stop the informer, and join every task.
    async fn stop(
        &self,
        stop_tx: watch::Sender<bool>,
        informer_task: JoinHandle<()>,
        worker_tasks: Vec<JoinHandle<()>>,
    ) {
        let shutdown_start = Instant::now();
        self.set_state(ControllerState::Draining);

        // Workers finish what is already queued, then see `None`
        self.queue.shut_down();
        stop_tx.send_replace(true);

        if let Err(e) = informer_task.await {
            warn!(error = %e, "Informer task ended abnormally");
        }
        for task in worker_tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        self.set_state(ControllerState::Stopped);
        info!(
            shutdown_ms = shutdown_start.elapsed().as_millis() as u64,
            "Controller stopped"
        );
    }
}
