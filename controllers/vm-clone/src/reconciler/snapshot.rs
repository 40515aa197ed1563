//! Snapshot acquisition for VirtualMachine sources

use super::Reconciler;
use crate::error::ControllerError;
use crate::plan::ClonePlan;
use crds::{TypedReference, VirtualMachine, VirtualMachineSnapshot, VirtualMachineSnapshotSpec};
use tracing::{debug, error, info};

/// Owned snapshot of the source VM, named after the clone's UID
pub fn build_snapshot(plan: &ClonePlan, name: &str) -> VirtualMachineSnapshot {
    let mut snapshot = VirtualMachineSnapshot::new(
        name,
        VirtualMachineSnapshotSpec {
            source: TypedReference::virtual_machine(plan.source.name()),
            extra: Default::default(),
        },
    );
    snapshot.metadata.namespace = Some(plan.namespace.clone());
    snapshot.metadata.owner_references = Some(vec![plan.owner_reference.clone()]);
    snapshot
}

impl Reconciler {
    pub(crate) async fn create_snapshot(&self, plan: &ClonePlan) -> Result<(), ControllerError> {
        let Some(name) = plan.owned_snapshot_name.as_deref() else {
            return Err(ControllerError::Reconciliation(format!(
                "VirtualMachineClone {} clones a snapshot and owns none",
                plan.key()
            )));
        };

        let snapshot = build_snapshot(plan, name);
        match self.client.create_snapshot(&plan.namespace, &snapshot).await {
            Ok(_) => {
                info!(
                    "Created VirtualMachineSnapshot {}/{} of VirtualMachine {}",
                    plan.namespace,
                    name,
                    plan.source.name()
                );
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("VirtualMachineSnapshot {}/{} already exists", plan.namespace, name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to create VirtualMachineSnapshot {}/{}: {}", plan.namespace, name, e);
                Err(e.into())
            }
        }
    }

    /// Names of claim-backed volumes of `vm` whose storage cannot be snapshotted
    pub(crate) async fn unsupported_volumes(
        &self,
        namespace: &str,
        vm: &VirtualMachine,
    ) -> Result<Vec<String>, ControllerError> {
        let mut unsupported = Vec::new();
        for volume in vm.spec.claim_volumes() {
            let Some(claim) = volume.claim_name() else {
                continue;
            };
            if !self.client.claim_supports_snapshots(namespace, claim).await? {
                debug!(
                    "Volume {} (claim {}/{}) does not support snapshots",
                    volume.name, namespace, claim
                );
                unsupported.push(volume.name.clone());
            }
        }
        Ok(unsupported)
    }
}
