//! VirtClient trait for mocking
//!
//! This trait abstracts every API call the clone controller makes so the
//! reconciler can be exercised in unit tests without a cluster.

use crate::error::VirtError;
use crds::{
    VirtualMachine, VirtualMachineRestore, VirtualMachineSnapshot, VirtualMachineSnapshotContent,
};
use k8s_openapi::api::apps::v1::ControllerRevision;

/// Trait for KubeVirt API client operations
///
/// Getters return `Ok(None)` for objects that do not exist. Creators return
/// `VirtError::AlreadyExists` when the name is taken and deleters return
/// `VirtError::NotFound` when the object is already gone.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait VirtClientTrait: Send + Sync {
    // VirtualMachine
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, VirtError>;
    /// Applies a JSON merge patch to a VirtualMachine
    async fn patch_vm(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<VirtualMachine, VirtError>;

    // Snapshots
    async fn get_snapshot(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshot>, VirtError>;
    async fn create_snapshot(&self, namespace: &str, snapshot: &VirtualMachineSnapshot) -> Result<VirtualMachineSnapshot, VirtError>;
    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), VirtError>;
    async fn get_snapshot_content(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshotContent>, VirtError>;

    // Restores
    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineRestore>, VirtError>;
    async fn create_restore(&self, namespace: &str, restore: &VirtualMachineRestore) -> Result<VirtualMachineRestore, VirtError>;
    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<(), VirtError>;

    // ControllerRevisions
    async fn get_controller_revision(&self, namespace: &str, name: &str) -> Result<Option<ControllerRevision>, VirtError>;
    async fn create_controller_revision(&self, namespace: &str, revision: &ControllerRevision) -> Result<ControllerRevision, VirtError>;

    /// Whether the storage behind a claim can be snapshotted
    async fn claim_supports_snapshots(&self, namespace: &str, claim_name: &str) -> Result<bool, VirtError>;

    /// Applies a JSON merge patch to a VirtualMachineClone's status subresource
    async fn patch_clone_status(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), VirtError>;
}
