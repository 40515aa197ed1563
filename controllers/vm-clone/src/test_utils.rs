//! Test utilities for unit testing the reconciler
//!
//! Factories for the objects a clone touches plus a helper that drives a
//! clone through one reconcile against the mock client.

use crate::config::Config;
use crate::error::ControllerError;
use crate::health::Metrics;
use crate::reconciler::Reconciler;
use crds::*;
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use kube_runtime::controller::Action;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use virt_client::MockVirtClient;

pub const TEST_NAMESPACE: &str = "default";
pub const SOURCE_UUID: &str = "1f2b3c4d-0000-4000-8000-000000000001";
pub const SOURCE_MAC: &str = "02:00:00:00:00:01";
pub const SOURCE_SERIAL: &str = "source-serial";

fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Helper to create a test VirtualMachine.
///
/// Labels and annotations are `key1`/`key2`; the domain has two interfaces,
/// a firmware UUID and serial, and one DataVolume-backed disk.
pub fn create_test_vm(name: &str, revisions: Option<(&str, &str)>) -> VirtualMachine {
    let mut spec: VirtualMachineSpec = serde_json::from_value(json!({
        "runStrategy": "Halted",
        "template": {
            "metadata": { "labels": { "kubevirt.io/vm": name } },
            "spec": {
                "domain": {
                    "cpu": { "cores": 1 },
                    "devices": {
                        "disks": [{ "name": "rootdisk", "disk": { "bus": "virtio" } }],
                        "interfaces": [
                            { "name": "eth0", "macAddress": SOURCE_MAC, "masquerade": {} },
                            { "name": "eth1", "macAddress": "02:00:00:00:00:02", "bridge": {} }
                        ]
                    },
                    "firmware": { "uuid": SOURCE_UUID, "serial": SOURCE_SERIAL }
                },
                "networks": [
                    { "name": "eth0", "pod": {} },
                    { "name": "eth1", "multus": { "networkName": "secondary" } }
                ],
                "volumes": [
                    { "name": "rootdisk", "dataVolume": { "name": format!("{}-rootdisk", name) } },
                    { "name": "cloudinit", "cloudInitNoCloud": { "userData": "#cloud-config" } }
                ]
            }
        }
    }))
    .unwrap();

    if let Some((instancetype_revision, preference_revision)) = revisions {
        spec.instancetype = Some(RevisionMatcher {
            name: Some("u1.small".to_string()),
            kind: Some("VirtualMachineClusterInstancetype".to_string()),
            revision_name: Some(instancetype_revision.to_string()),
            ..Default::default()
        });
        spec.preference = Some(RevisionMatcher {
            name: Some("fedora".to_string()),
            kind: Some("VirtualMachineClusterPreference".to_string()),
            revision_name: Some(preference_revision.to_string()),
            ..Default::default()
        });
    }

    let mut vm = VirtualMachine::new(name, spec);
    vm.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    vm.metadata.labels = Some(string_map(&[("key1", "value1"), ("key2", "value2")]));
    vm.metadata.annotations = Some(string_map(&[("key1", "value1"), ("key2", "value2")]));
    vm
}

/// Helper to create a test VirtualMachineClone from a VM source
pub fn create_test_clone(name: &str, source_vm: &str, target_vm: &str) -> VirtualMachineClone {
    VirtualMachineClone::new_minimal(name, TEST_NAMESPACE)
        .from_vm(source_vm)
        .with_target(target_vm)
}

/// Helper to create a user-owned VirtualMachineSnapshot of `source_vm`
pub fn create_test_snapshot(name: &str, source_vm: &str) -> VirtualMachineSnapshot {
    let mut snapshot = VirtualMachineSnapshot::new(
        name,
        VirtualMachineSnapshotSpec {
            source: TypedReference::virtual_machine(source_vm),
            extra: Default::default(),
        },
    );
    snapshot.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    snapshot
}

/// Helper to create a test ControllerRevision with an opaque payload
pub fn create_test_revision(name: &str, payload: serde_json::Value) -> ControllerRevision {
    ControllerRevision {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels: Some(string_map(&[("instancetype.kubevirt.io/object-kind", "VirtualMachineClusterInstancetype")])),
            ..Default::default()
        },
        data: Some(RawExtension(payload)),
        revision: 1,
    }
}

pub fn test_config() -> Config {
    Config {
        backoff_min_secs: 5,
        backoff_max_secs: 300,
        ..Config::default()
    }
}

/// Helper to create a reconciler backed by (a clone of) `mock`
pub fn create_test_reconciler(mock: &MockVirtClient, config: &Config) -> Reconciler {
    let metrics = Arc::new(Metrics::new().unwrap());
    Reconciler::new(mock.clone(), config, metrics)
}

/// Fetches the clone's current state from the mock and reconciles it once
pub async fn reconcile_once(
    reconciler: &Reconciler,
    mock: &MockVirtClient,
    name: &str,
) -> Result<Action, ControllerError> {
    let clone = mock.clone_request(TEST_NAMESPACE, name).unwrap();
    reconciler.reconcile_clone(&clone).await
}

/// Current phase of a clone stored in the mock
pub fn phase_of(mock: &MockVirtClient, name: &str) -> ClonePhase {
    mock.clone_request(TEST_NAMESPACE, name)
        .map(|c| c.phase())
        .unwrap_or_default()
}

/// Ready condition of a clone stored in the mock
pub fn ready_condition(mock: &MockVirtClient, name: &str) -> Option<Condition> {
    mock.clone_request(TEST_NAMESPACE, name)
        .and_then(|c| c.status)
        .and_then(|s| s.conditions.into_iter().find(|c| c.type_ == CONDITION_READY))
}
