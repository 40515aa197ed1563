//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, reconciler, watcher and health server together.

use crate::config::Config;
use crate::error::ControllerError;
use crate::health::{self, HealthState, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{VirtualMachineClone, VirtualMachineRestore, VirtualMachineSnapshot};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use virt_client::VirtClient;

/// Main controller for VirtualMachineClone resources.
pub struct Controller {
    clone_watcher: JoinHandle<Result<(), ControllerError>>,
    health_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing VirtualMachineClone Controller");

        let kube_client = Client::try_default().await?;

        let metrics = Arc::new(Metrics::new()?);
        let health_state = Arc::new(HealthState::new(metrics.clone()));

        let (clone_api, snapshot_api, restore_api): (
            Api<VirtualMachineClone>,
            Api<VirtualMachineSnapshot>,
            Api<VirtualMachineRestore>,
        ) = match config.namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (
                Api::all(kube_client.clone()),
                Api::all(kube_client.clone()),
                Api::all(kube_client.clone()),
            ),
        };

        let reconciler = Arc::new(Reconciler::new(
            VirtClient::new(kube_client),
            &config,
            metrics,
        ));

        let watcher_instance = Watcher::new(
            reconciler,
            health_state.clone(),
            clone_api,
            snapshot_api,
            restore_api,
            config.debounce,
            config.workers,
        );

        let clone_watcher = tokio::spawn(async move { watcher_instance.watch_clones().await });

        let metrics_addr = config.metrics_addr;
        let health_server = tokio::spawn(async move { health::serve(metrics_addr, health_state).await });

        Ok(Self {
            clone_watcher,
            health_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("VirtualMachineClone Controller running");

        tokio::select! {
            result = &mut self.clone_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("VirtualMachineClone watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("VirtualMachineClone watcher error: {}", e)))?;
            }
            result = &mut self.health_server => {
                result.map_err(|e| ControllerError::Watch(format!("Health server panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Health server error: {}", e)))?;
            }
        }

        info!("VirtualMachineClone Controller stopped");
        Ok(())
    }
}
