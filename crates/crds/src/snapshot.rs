//! KubeVirt snapshot resources
//!
//! `VirtualMachineSnapshot` and `VirtualMachineSnapshotContent` as produced by
//! the KubeVirt snapshot controller. The clone controller creates snapshots
//! but never writes their status or content.

use crate::references::TypedReference;
use crate::virtual_machine::{EmbeddedVirtualMachine, ExtraFields};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[kube(
    group = "snapshot.kubevirt.io",
    version = "v1alpha1",
    kind = "VirtualMachineSnapshot",
    namespaced,
    status = "VirtualMachineSnapshotStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotSpec {
    /// The VirtualMachine being snapshotted
    pub source: TypedReference,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_snapshot_content_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VirtualMachineSnapshot {
    /// Ready to use and backed by content
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.ready_to_use == Some(true) && s.virtual_machine_snapshot_content_name.is_some())
            .unwrap_or(false)
    }

    /// Name of the content object, once the snapshot controller has bound one
    pub fn content_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.virtual_machine_snapshot_content_name.as_deref())
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[kube(
    group = "snapshot.kubevirt.io",
    version = "v1alpha1",
    kind = "VirtualMachineSnapshotContent",
    namespaced,
    status = "VirtualMachineSnapshotContentStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotContentSpec {
    #[serde(default)]
    pub source: SnapshotSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_snapshot_name: Option<String>,

    /// Volumes whose data was captured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_backups: Vec<VolumeBackup>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSource {
    /// The VirtualMachine as it was when the snapshot was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine: Option<EmbeddedVirtualMachine>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBackup {
    pub volume_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_name: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSnapshotContentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VirtualMachineSnapshotContent {
    /// Claim-backed volumes of the embedded VM that have no volume backup.
    ///
    /// Returns the volume names in spec order.
    pub fn volumes_missing_backup(&self) -> Vec<String> {
        let Some(vm) = &self.spec.source.virtual_machine else {
            return Vec::new();
        };
        vm.spec
            .claim_volumes()
            .into_iter()
            .filter(|volume| {
                !self
                    .spec
                    .volume_backups
                    .iter()
                    .any(|backup| backup.volume_name == volume.name)
            })
            .map(|volume| volume.name.clone())
            .collect()
    }
}
