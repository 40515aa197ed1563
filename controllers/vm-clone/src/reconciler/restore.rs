//! Restore orchestration

use super::Reconciler;
use crate::error::ControllerError;
use crate::plan::ClonePlan;
use crds::{TypedReference, VirtualMachineRestore, VirtualMachineRestoreSpec};
use tracing::{debug, error, info};

/// Owned restore materializing the clone's snapshot as the target VM
pub fn build_restore(plan: &ClonePlan) -> VirtualMachineRestore {
    let mut restore = VirtualMachineRestore::new(
        &plan.restore_name,
        VirtualMachineRestoreSpec {
            target: TypedReference::virtual_machine(&plan.target_name),
            virtual_machine_snapshot_name: plan.restore_snapshot_name().to_string(),
            extra: Default::default(),
        },
    );
    restore.metadata.namespace = Some(plan.namespace.clone());
    restore.metadata.owner_references = Some(vec![plan.owner_reference.clone()]);
    restore
}

impl Reconciler {
    pub(crate) async fn create_restore(&self, plan: &ClonePlan) -> Result<(), ControllerError> {
        let restore = build_restore(plan);
        match self.client.create_restore(&plan.namespace, &restore).await {
            Ok(_) => {
                info!(
                    "Created VirtualMachineRestore {}/{} from snapshot {} into {}",
                    plan.namespace,
                    plan.restore_name,
                    plan.restore_snapshot_name(),
                    plan.target_name
                );
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("VirtualMachineRestore {}/{} already exists", plan.namespace, plan.restore_name);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to create VirtualMachineRestore {}/{}: {}",
                    plan.namespace, plan.restore_name, e
                );
                Err(e.into())
            }
        }
    }
}
