//! KubeVirt VirtualMachineRestore

use crate::references::TypedReference;
use crate::virtual_machine::ExtraFields;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[kube(
    group = "snapshot.kubevirt.io",
    version = "v1alpha1",
    kind = "VirtualMachineRestore",
    namespaced,
    status = "VirtualMachineRestoreStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineRestoreSpec {
    /// VirtualMachine to create (or overwrite) from the snapshot
    pub target: TypedReference,

    /// Snapshot to restore from
    pub virtual_machine_snapshot_name: String,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineRestoreStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VirtualMachineRestore {
    pub fn is_complete(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.complete)
            .unwrap_or(false)
    }
}
