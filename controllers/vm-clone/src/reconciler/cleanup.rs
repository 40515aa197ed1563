//! Cleanup of owned intermediates once a clone is terminal
//!
//! Deletion is best effort. Whatever could not be removed is reported back
//! so its name stays in status and the next reconcile retries it.

use super::Reconciler;
use crate::plan::ClonePlan;
use tracing::{debug, info, warn};
use virt_client::VirtError;

/// Names still pending deletion after a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub snapshot_name: Option<String>,
    pub restore_name: Option<String>,
}

impl CleanupOutcome {
    pub fn is_complete(&self) -> bool {
        self.snapshot_name.is_none() && self.restore_name.is_none()
    }
}

/// Collapses a delete result into the name left behind, if any
fn leftover(kind: &str, namespace: &str, name: &str, result: Result<(), VirtError>) -> Option<String> {
    match result {
        Ok(()) => {
            info!("Deleted {} {}/{}", kind, namespace, name);
            None
        }
        Err(e) if e.is_not_found() => {
            debug!("{} {}/{} already gone", kind, namespace, name);
            None
        }
        Err(e) => {
            warn!("Failed to delete {} {}/{}: {}", kind, namespace, name, e);
            Some(name.to_string())
        }
    }
}

impl Reconciler {
    /// Deletes the restore, then the owned snapshot.
    ///
    /// A snapshot name that is not the clone's own snapshot is dropped from
    /// status without touching the object.
    pub(crate) async fn cleanup(
        &self,
        plan: &ClonePlan,
        snapshot_name: Option<&str>,
        restore_name: Option<&str>,
    ) -> CleanupOutcome {
        let ns = plan.namespace.as_str();
        let mut outcome = CleanupOutcome::default();

        if let Some(name) = restore_name {
            let result = self.client.delete_restore(ns, name).await;
            outcome.restore_name = leftover("VirtualMachineRestore", ns, name, result);
        }

        if let Some(name) = snapshot_name {
            if plan.owned_snapshot_name.as_deref() == Some(name) {
                let result = self.client.delete_snapshot(ns, name).await;
                outcome.snapshot_name = leftover("VirtualMachineSnapshot", ns, name, result);
            } else {
                warn!(
                    "VirtualMachineClone {} does not own snapshot {}, leaving it in place",
                    plan.key(),
                    name
                );
            }
        }

        if outcome.is_complete() {
            debug!("Cleanup of VirtualMachineClone {} complete", plan.key());
        }
        outcome
    }
}
