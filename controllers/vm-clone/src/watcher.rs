//! Kubernetes resource watchers.
//!
//! Drives reconciliation of VirtualMachineClone resources with
//! `kube_runtime::Controller`. Owned snapshots and restores are watched as
//! well, so a snapshot turning ready or a restore completing wakes up the
//! clone that created it.

use crate::error::ControllerError;
use crate::health::HealthState;
use crate::reconciler::Reconciler;
use crds::{VirtualMachineClone, VirtualMachineRestore, VirtualMachineSnapshot};
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Reconcile entry point handed to the controller runtime
async fn reconcile(clone: Arc<VirtualMachineClone>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let started = Instant::now();
    let result = ctx.reconcile_clone(&clone).await;
    let elapsed = started.elapsed().as_secs_f64();

    match &result {
        Ok(action) => {
            debug!("Reconciled {:?} in {:.3}s, next: {:?}", clone.metadata.name, elapsed, action);
            ctx.metrics.record_reconcile("success", elapsed);
        }
        Err(e) => {
            error!("Reconciliation failed for VirtualMachineClone {:?}: {}", clone.metadata.name, e);
            ctx.metrics.record_reconcile("error", elapsed);
        }
    }
    result
}

fn error_policy(clone: Arc<VirtualMachineClone>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    ctx.error_policy(&clone, error)
}

/// Watches VirtualMachineClone resources and their owned intermediates.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    health: Arc<HealthState>,
    clone_api: Api<VirtualMachineClone>,
    snapshot_api: Api<VirtualMachineSnapshot>,
    restore_api: Api<VirtualMachineRestore>,
    debounce: Duration,
    workers: u16,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        health: Arc<HealthState>,
        clone_api: Api<VirtualMachineClone>,
        snapshot_api: Api<VirtualMachineSnapshot>,
        restore_api: Api<VirtualMachineRestore>,
        debounce: Duration,
        workers: u16,
    ) -> Self {
        Self {
            reconciler,
            health,
            clone_api,
            snapshot_api,
            restore_api,
            debounce,
            workers,
        }
    }

    /// Runs the clone controller until a shutdown signal arrives.
    pub async fn watch_clones(&self) -> Result<(), ControllerError> {
        info!(
            "Starting VirtualMachineClone watcher (debounce {:?}, {} workers)",
            self.debounce, self.workers
        );

        // Debounce batches the status update we write ourselves with the
        // owned-object events it usually arrives with
        let controller_config = ControllerConfig::default()
            .debounce(self.debounce)
            .concurrency(self.workers);

        let controller = Controller::new(self.clone_api.clone(), watcher::Config::default())
            .owns(self.snapshot_api.clone(), watcher::Config::default())
            .owns(self.restore_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal();

        self.health.set_ready(true);

        controller
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled VirtualMachineClone {}", obj),
                    Err(e) => error!("VirtualMachineClone controller error: {}", e),
                }
            })
            .await;

        self.health.set_ready(false);
        info!("VirtualMachineClone watcher stopped");
        Ok(())
    }
}
