//! Storage snapshot capability check
//!
//! A claim can be snapshotted when the CSI driver provisioning its
//! StorageClass has at least one VolumeSnapshotClass.

use crate::error::VirtError;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use tracing::debug;

const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";
const BETA_DEFAULT_CLASS_ANNOTATION: &str = "storageclass.beta.kubernetes.io/is-default-class";

/// Resolves `claim_name` to its CSI driver and looks for a matching
/// VolumeSnapshotClass.
pub async fn claim_supports_snapshots(
    client: &Client,
    namespace: &str,
    claim_name: &str,
) -> Result<bool, VirtError> {
    let claims: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    let claim = claims
        .get_opt(claim_name)
        .await
        .map_err(|e| VirtError::from_kube(e, format!("PersistentVolumeClaim {}/{}", namespace, claim_name)))?
        .ok_or_else(|| VirtError::NotFound(format!("PersistentVolumeClaim {}/{}", namespace, claim_name)))?;

    let classes: Api<StorageClass> = Api::all(client.clone());
    let class = match claim.spec.and_then(|s| s.storage_class_name) {
        Some(name) => classes.get_opt(&name).await.map_err(VirtError::Kube)?,
        None => {
            let all = classes.list(&ListParams::default()).await.map_err(VirtError::Kube)?;
            all.items.into_iter().find(is_default_class)
        }
    };

    let Some(class) = class else {
        debug!("Claim {}/{} has no resolvable StorageClass", namespace, claim_name);
        return Ok(false);
    };

    let drivers = snapshot_class_drivers(client).await?;
    Ok(driver_supported(&class.provisioner, &drivers))
}

/// Drivers of every VolumeSnapshotClass in the cluster.
///
/// An absent VolumeSnapshotClass API means no driver supports snapshots.
async fn snapshot_class_drivers(client: &Client) -> Result<Vec<String>, VirtError> {
    let gvk = GroupVersionKind::gvk("snapshot.storage.k8s.io", "v1", "VolumeSnapshotClass");
    let resource = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);

    match api.list(&ListParams::default()).await {
        Ok(list) => Ok(list
            .items
            .iter()
            .filter_map(|obj| obj.data.get("driver").and_then(|d| d.as_str()))
            .map(str::to_string)
            .collect()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(Vec::new()),
        Err(e) => Err(VirtError::Kube(e)),
    }
}

/// True when the class carries either default-class annotation set to "true"
pub fn is_default_class(class: &StorageClass) -> bool {
    class
        .metadata
        .annotations
        .as_ref()
        .map(|a| {
            [DEFAULT_CLASS_ANNOTATION, BETA_DEFAULT_CLASS_ANNOTATION]
                .iter()
                .any(|key| a.get(*key).map(String::as_str) == Some("true"))
        })
        .unwrap_or(false)
}

pub fn driver_supported(provisioner: &str, snapshot_drivers: &[String]) -> bool {
    snapshot_drivers.iter().any(|d| d == provisioner)
}
