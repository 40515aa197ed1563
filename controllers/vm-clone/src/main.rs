//! VirtualMachineClone Controller
//!
//! Turns a VirtualMachineClone request into a new, independent KubeVirt
//! VirtualMachine:
//! - snapshots the source VirtualMachine (or uses an existing snapshot)
//! - restores the snapshot into the target VirtualMachine
//! - rewrites the target's identity: labels, annotations, MAC addresses,
//!   firmware UUID and serial, instancetype/preference revisions
//! - removes the intermediate snapshot and restore it created

mod backoff;
mod config;
mod controller;
mod error;
mod filters;
mod health;
mod phase;
mod plan;
mod reconcile_helpers;
mod reconciler;
mod watcher;

#[cfg(test)]
mod phase_test;
#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting VirtualMachineClone Controller");

    let config = Config::from_env()?;
    config.log();

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
