//! Kubernetes-backed implementation of `VirtClientTrait`

use crate::error::VirtError;
use crate::storage;
use crate::virt_trait::VirtClientTrait;
use crds::{
    VirtualMachine, VirtualMachineClone, VirtualMachineRestore, VirtualMachineSnapshot,
    VirtualMachineSnapshotContent,
};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::ControllerRevision;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// KubeVirt API client
#[derive(Clone)]
pub struct VirtClient {
    client: Client,
}

impl VirtClient {
    /// Wraps an existing Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, VirtError> {
        let client = Client::try_default().await.map_err(VirtError::Kube)?;
        Ok(Self::new(client))
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, VirtError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| VirtError::from_kube(e, describe::<K>(namespace, name)))
    }

    async fn create<K>(&self, namespace: &str, object: &K) -> Result<K, VirtError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let name = object.meta().name.clone().unwrap_or_default();
        debug!("Creating {}", describe::<K>(namespace, &name));
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| VirtError::from_kube(e, describe::<K>(namespace, &name)))
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<(), VirtError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        debug!("Deleting {}", describe::<K>(namespace, name));
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| VirtError::from_kube(e, describe::<K>(namespace, name)))
    }
}

fn describe<K>(namespace: &str, name: &str) -> String
where
    K: Resource,
    K::DynamicType: Default,
{
    format!("{} {}/{}", K::kind(&K::DynamicType::default()), namespace, name)
}

#[async_trait::async_trait]
impl VirtClientTrait for VirtClient {
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, VirtError> {
        self.get_opt(namespace, name).await
    }

    async fn patch_vm(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<VirtualMachine, VirtError> {
        self.api::<VirtualMachine>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| VirtError::from_kube(e, describe::<VirtualMachine>(namespace, name)))
    }

    async fn get_snapshot(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshot>, VirtError> {
        self.get_opt(namespace, name).await
    }

    async fn create_snapshot(&self, namespace: &str, snapshot: &VirtualMachineSnapshot) -> Result<VirtualMachineSnapshot, VirtError> {
        self.create(namespace, snapshot).await
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        self.delete::<VirtualMachineSnapshot>(namespace, name).await
    }

    async fn get_snapshot_content(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshotContent>, VirtError> {
        self.get_opt(namespace, name).await
    }

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineRestore>, VirtError> {
        self.get_opt(namespace, name).await
    }

    async fn create_restore(&self, namespace: &str, restore: &VirtualMachineRestore) -> Result<VirtualMachineRestore, VirtError> {
        self.create(namespace, restore).await
    }

    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        self.delete::<VirtualMachineRestore>(namespace, name).await
    }

    async fn get_controller_revision(&self, namespace: &str, name: &str) -> Result<Option<ControllerRevision>, VirtError> {
        self.get_opt(namespace, name).await
    }

    async fn create_controller_revision(&self, namespace: &str, revision: &ControllerRevision) -> Result<ControllerRevision, VirtError> {
        self.create(namespace, revision).await
    }

    async fn claim_supports_snapshots(&self, namespace: &str, claim_name: &str) -> Result<bool, VirtError> {
        storage::claim_supports_snapshots(&self.client, namespace, claim_name).await
    }

    async fn patch_clone_status(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), VirtError> {
        self.api::<VirtualMachineClone>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| VirtError::from_kube(e, describe::<VirtualMachineClone>(namespace, name)))
    }
}
