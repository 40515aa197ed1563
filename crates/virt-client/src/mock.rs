//! Mock VirtClient for unit testing
//!
//! In-memory implementation of `VirtClientTrait`. Besides storing objects it
//! can play the part of the KubeVirt snapshot and restore controllers
//! (`complete_snapshot`, `complete_restore`) so a clone can be driven through
//! every phase without a cluster.

use crate::error::VirtError;
use crate::virt_trait::VirtClientTrait;
use crds::{
    EmbeddedVirtualMachine, SnapshotSource, VirtualMachine, VirtualMachineClone,
    VirtualMachineRestore, VirtualMachineRestoreStatus, VirtualMachineSnapshot,
    VirtualMachineSnapshotContent, VirtualMachineSnapshotContentSpec,
    VirtualMachineSnapshotStatus, VolumeBackup,
};
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Number of mutating calls seen by the mock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub snapshots_created: usize,
    pub snapshots_deleted: usize,
    pub restores_created: usize,
    pub restores_deleted: usize,
    pub revisions_created: usize,
    pub vm_patches: usize,
    pub status_patches: usize,
}

impl CallCounts {
    /// Total number of writes of any kind
    pub fn total_writes(&self) -> usize {
        self.snapshots_created
            + self.snapshots_deleted
            + self.restores_created
            + self.restores_deleted
            + self.revisions_created
            + self.vm_patches
            + self.status_patches
    }
}

/// Mock VirtClient for testing
#[derive(Clone, Default)]
pub struct MockVirtClient {
    vms: Arc<Mutex<HashMap<Key, VirtualMachine>>>,
    snapshots: Arc<Mutex<HashMap<Key, VirtualMachineSnapshot>>>,
    contents: Arc<Mutex<HashMap<Key, VirtualMachineSnapshotContent>>>,
    restores: Arc<Mutex<HashMap<Key, VirtualMachineRestore>>>,
    revisions: Arc<Mutex<HashMap<Key, ControllerRevision>>>,
    clones: Arc<Mutex<HashMap<Key, VirtualMachineClone>>>,
    // Claims whose storage lacks snapshot support
    unsupported_claims: Arc<Mutex<HashSet<Key>>>,
    fail_deletes: Arc<Mutex<bool>>,
    calls: Arc<Mutex<CallCounts>>,
    // Counter for generating UIDs
    next_uid: Arc<Mutex<u64>>,
}

impl MockVirtClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_uid(&self, meta: &mut ObjectMeta) {
        if meta.uid.is_none() {
            let mut next = self.next_uid.lock().unwrap();
            *next += 1;
            meta.uid = Some(format!("00000000-0000-0000-0000-{:012}", *next));
        }
    }

    /// Add a VirtualMachine to the mock store (for test setup)
    pub fn add_vm(&self, mut vm: VirtualMachine) {
        self.assign_uid(&mut vm.metadata);
        let k = key(&vm.namespace().unwrap_or_default(), &vm.name_any());
        self.vms.lock().unwrap().insert(k, vm);
    }

    /// Add a VirtualMachineSnapshot to the mock store (for test setup)
    pub fn add_snapshot(&self, mut snapshot: VirtualMachineSnapshot) {
        self.assign_uid(&mut snapshot.metadata);
        let k = key(&snapshot.namespace().unwrap_or_default(), &snapshot.name_any());
        self.snapshots.lock().unwrap().insert(k, snapshot);
    }

    /// Add a VirtualMachineSnapshotContent to the mock store (for test setup)
    pub fn add_snapshot_content(&self, content: VirtualMachineSnapshotContent) {
        let k = key(&content.namespace().unwrap_or_default(), &content.name_any());
        self.contents.lock().unwrap().insert(k, content);
    }

    /// Add a ControllerRevision to the mock store (for test setup)
    pub fn add_revision(&self, revision: ControllerRevision) {
        let k = key(&revision.namespace().unwrap_or_default(), &revision.name_any());
        self.revisions.lock().unwrap().insert(k, revision);
    }

    /// Add a VirtualMachineClone so status patches have a target
    pub fn add_clone(&self, mut clone: VirtualMachineClone) {
        self.assign_uid(&mut clone.metadata);
        let k = key(&clone.namespace().unwrap_or_default(), &clone.name_any());
        self.clones.lock().unwrap().insert(k, clone);
    }

    /// Report the claim as backed by storage without snapshot support
    pub fn set_claim_unsupported(&self, namespace: &str, claim_name: &str) {
        self.unsupported_claims.lock().unwrap().insert(key(namespace, claim_name));
    }

    /// Make every delete call fail with a server error
    pub fn set_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock().unwrap() = fail;
    }

    /// Remove a snapshot without counting it as a controller delete
    pub fn remove_snapshot(&self, namespace: &str, name: &str) {
        self.snapshots.lock().unwrap().remove(&key(namespace, name));
    }

    /// Remove a restore without counting it as a controller delete
    pub fn remove_restore(&self, namespace: &str, name: &str) {
        self.restores.lock().unwrap().remove(&key(namespace, name));
    }

    pub fn vm(&self, namespace: &str, name: &str) -> Option<VirtualMachine> {
        self.vms.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<VirtualMachineSnapshot> {
        self.snapshots.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn restore(&self, namespace: &str, name: &str) -> Option<VirtualMachineRestore> {
        self.restores.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn revision(&self, namespace: &str, name: &str) -> Option<ControllerRevision> {
        self.revisions.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn clone_request(&self, namespace: &str, name: &str) -> Option<VirtualMachineClone> {
        self.clones.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Snapshot of the call counters
    pub fn calls(&self) -> CallCounts {
        self.calls.lock().unwrap().clone()
    }

    /// Simulates the snapshot controller: captures the source VM into a
    /// content object and marks the snapshot ready.
    ///
    /// Returns false when the snapshot or its source VM does not exist.
    pub fn complete_snapshot(&self, namespace: &str, name: &str) -> bool {
        let Some(mut snapshot) = self.snapshot(namespace, name) else {
            return false;
        };
        let Some(vm) = self.vm(namespace, &snapshot.spec.source.name) else {
            return false;
        };

        let content_name = format!("vmsnapshot-content-{}", name);
        let volume_backups = vm
            .spec
            .claim_volumes()
            .iter()
            .map(|volume| VolumeBackup {
                volume_name: volume.name.clone(),
                volume_snapshot_name: Some(format!("vmsnapshot-{}-volume-{}", name, volume.name)),
                ..Default::default()
            })
            .collect();

        let mut content = VirtualMachineSnapshotContent::new(
            &content_name,
            VirtualMachineSnapshotContentSpec {
                source: SnapshotSource {
                    virtual_machine: Some(EmbeddedVirtualMachine {
                        metadata: ObjectMeta {
                            name: vm.metadata.name.clone(),
                            namespace: vm.metadata.namespace.clone(),
                            labels: vm.metadata.labels.clone(),
                            annotations: vm.metadata.annotations.clone(),
                            ..Default::default()
                        },
                        spec: vm.spec.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                virtual_machine_snapshot_name: Some(name.to_string()),
                volume_backups,
                ..Default::default()
            },
        );
        content.metadata.namespace = Some(namespace.to_string());
        self.add_snapshot_content(content);

        snapshot.status = Some(VirtualMachineSnapshotStatus {
            ready_to_use: Some(true),
            virtual_machine_snapshot_content_name: Some(content_name),
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        self.snapshots.lock().unwrap().insert(key(namespace, name), snapshot);
        true
    }

    /// Simulates the restore controller: creates the target VM from the
    /// snapshot content and marks the restore complete.
    ///
    /// Returns false when any object in the restore -> snapshot -> content
    /// chain is missing.
    pub fn complete_restore(&self, namespace: &str, name: &str) -> bool {
        let Some(mut restore) = self.restore(namespace, name) else {
            return false;
        };
        let Some(snapshot) = self.snapshot(namespace, &restore.spec.virtual_machine_snapshot_name) else {
            return false;
        };
        let Some(content_name) = snapshot.content_name() else {
            return false;
        };
        let Some(embedded) = self
            .contents
            .lock()
            .unwrap()
            .get(&key(namespace, content_name))
            .and_then(|c| c.spec.source.virtual_machine.clone())
        else {
            return false;
        };

        let mut target = VirtualMachine::new(&restore.spec.target.name, embedded.spec);
        target.metadata.namespace = Some(namespace.to_string());
        target.metadata.labels = embedded.metadata.labels;
        target.metadata.annotations = embedded.metadata.annotations;
        self.add_vm(target);

        restore.status = Some(VirtualMachineRestoreStatus {
            complete: Some(true),
            ..Default::default()
        });
        self.restores.lock().unwrap().insert(key(namespace, name), restore);
        true
    }

    fn deletes_failing(&self) -> bool {
        *self.fail_deletes.lock().unwrap()
    }
}

/// Applies an RFC 7386 JSON merge patch to `target`
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (field, value) in patch_map {
            if value.is_null() {
                target_map.remove(field);
            } else {
                apply_merge_patch(target_map.entry(field.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn patched<K>(object: &K, patch: &Value) -> Result<K, VirtError>
where
    K: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(object)?;
    apply_merge_patch(&mut value, patch);
    Ok(serde_json::from_value(value)?)
}

fn server_error(message: &str) -> VirtError {
    VirtError::InvalidRequest(format!("mock failure: {}", message))
}

#[async_trait::async_trait]
impl VirtClientTrait for MockVirtClient {
    async fn get_vm(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, VirtError> {
        Ok(self.vm(namespace, name))
    }

    async fn patch_vm(&self, namespace: &str, name: &str, patch: &Value) -> Result<VirtualMachine, VirtError> {
        let mut vms = self.vms.lock().unwrap();
        let vm = vms
            .get_mut(&key(namespace, name))
            .ok_or_else(|| VirtError::NotFound(format!("VirtualMachine {}/{}", namespace, name)))?;
        *vm = patched(vm, patch)?;
        self.calls.lock().unwrap().vm_patches += 1;
        Ok(vm.clone())
    }

    async fn get_snapshot(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshot>, VirtError> {
        Ok(self.snapshot(namespace, name))
    }

    async fn create_snapshot(&self, namespace: &str, snapshot: &VirtualMachineSnapshot) -> Result<VirtualMachineSnapshot, VirtError> {
        let name = snapshot.name_any();
        if self.snapshot(namespace, &name).is_some() {
            return Err(VirtError::AlreadyExists(format!("VirtualMachineSnapshot {}/{}", namespace, name)));
        }
        let mut created = snapshot.clone();
        created.metadata.namespace = Some(namespace.to_string());
        self.add_snapshot(created.clone());
        self.calls.lock().unwrap().snapshots_created += 1;
        Ok(self.snapshot(namespace, &name).unwrap_or(created))
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        if self.deletes_failing() {
            return Err(server_error("delete snapshot"));
        }
        self.snapshots
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .ok_or_else(|| VirtError::NotFound(format!("VirtualMachineSnapshot {}/{}", namespace, name)))?;
        self.calls.lock().unwrap().snapshots_deleted += 1;
        Ok(())
    }

    async fn get_snapshot_content(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineSnapshotContent>, VirtError> {
        Ok(self.contents.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachineRestore>, VirtError> {
        Ok(self.restore(namespace, name))
    }

    async fn create_restore(&self, namespace: &str, restore: &VirtualMachineRestore) -> Result<VirtualMachineRestore, VirtError> {
        let name = restore.name_any();
        let mut restores = self.restores.lock().unwrap();
        if restores.contains_key(&key(namespace, &name)) {
            return Err(VirtError::AlreadyExists(format!("VirtualMachineRestore {}/{}", namespace, name)));
        }
        let mut created = restore.clone();
        created.metadata.namespace = Some(namespace.to_string());
        restores.insert(key(namespace, &name), created.clone());
        self.calls.lock().unwrap().restores_created += 1;
        Ok(created)
    }

    async fn delete_restore(&self, namespace: &str, name: &str) -> Result<(), VirtError> {
        if self.deletes_failing() {
            return Err(server_error("delete restore"));
        }
        self.restores
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .ok_or_else(|| VirtError::NotFound(format!("VirtualMachineRestore {}/{}", namespace, name)))?;
        self.calls.lock().unwrap().restores_deleted += 1;
        Ok(())
    }

    async fn get_controller_revision(&self, namespace: &str, name: &str) -> Result<Option<ControllerRevision>, VirtError> {
        Ok(self.revision(namespace, name))
    }

    async fn create_controller_revision(&self, namespace: &str, revision: &ControllerRevision) -> Result<ControllerRevision, VirtError> {
        let name = revision.name_any();
        let mut revisions = self.revisions.lock().unwrap();
        if revisions.contains_key(&key(namespace, &name)) {
            return Err(VirtError::AlreadyExists(format!("ControllerRevision {}/{}", namespace, name)));
        }
        let mut created = revision.clone();
        created.metadata.namespace = Some(namespace.to_string());
        revisions.insert(key(namespace, &name), created.clone());
        self.calls.lock().unwrap().revisions_created += 1;
        Ok(created)
    }

    async fn claim_supports_snapshots(&self, namespace: &str, claim_name: &str) -> Result<bool, VirtError> {
        Ok(!self.unsupported_claims.lock().unwrap().contains(&key(namespace, claim_name)))
    }

    async fn patch_clone_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<(), VirtError> {
        let mut clones = self.clones.lock().unwrap();
        let clone = clones
            .get_mut(&key(namespace, name))
            .ok_or_else(|| VirtError::NotFound(format!("VirtualMachineClone {}/{}", namespace, name)))?;
        *clone = patched(clone, patch)?;
        self.calls.lock().unwrap().status_patches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_semantics() {
        let mut target = json!({
            "a": "b",
            "c": { "d": "e", "f": "g" },
            "list": [1, 2, 3]
        });
        apply_merge_patch(
            &mut target,
            &json!({
                "a": "z",
                "c": { "f": null, "h": "i" },
                "list": [4]
            }),
        );
        assert_eq!(
            target,
            json!({ "a": "z", "c": { "d": "e", "h": "i" }, "list": [4] })
        );
    }

    #[test]
    fn test_merge_patch_creates_missing_objects() {
        let mut target = json!({ "metadata": { "name": "vm" } });
        apply_merge_patch(&mut target, &json!({ "metadata": { "labels": { "k": "v" } } }));
        assert_eq!(target["metadata"]["labels"]["k"], "v");
        assert_eq!(target["metadata"]["name"], "vm");
    }
}
