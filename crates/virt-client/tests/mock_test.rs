//! Tests for the in-memory client and its collaborator simulation

#![cfg(feature = "test-util")]

use crds::{
    TypedReference, VirtualMachine, VirtualMachineRestore, VirtualMachineRestoreSpec,
    VirtualMachineSnapshot, VirtualMachineSnapshotSpec,
};
use serde_json::json;
use virt_client::{MockVirtClient, VirtClientTrait};

fn source_vm() -> VirtualMachine {
    let mut vm: VirtualMachine = serde_json::from_value(json!({
        "apiVersion": "kubevirt.io/v1",
        "kind": "VirtualMachine",
        "metadata": {
            "name": "source",
            "namespace": "ns",
            "labels": { "app": "db" },
            "annotations": { "note": "x" }
        },
        "spec": { "template": { "spec": {
            "domain": { "devices": { "interfaces": [{ "name": "eth0", "macAddress": "02:00:00:00:00:01" }] } },
            "volumes": [{ "name": "root", "dataVolume": { "name": "root-dv" } }]
        } } }
    }))
    .unwrap();
    vm.metadata.uid = Some("source-uid".to_string());
    vm
}

#[tokio::test]
async fn test_snapshot_and_restore_simulation() {
    let client = MockVirtClient::new();
    client.add_vm(source_vm());

    let mut snapshot = VirtualMachineSnapshot::new(
        "snap",
        VirtualMachineSnapshotSpec {
            source: TypedReference::virtual_machine("source"),
            ..Default::default()
        },
    );
    snapshot.metadata.namespace = Some("ns".to_string());
    client.create_snapshot("ns", &snapshot).await.unwrap();
    assert!(!client.snapshot("ns", "snap").unwrap().is_ready());

    assert!(client.complete_snapshot("ns", "snap"));
    let snapshot = client.snapshot("ns", "snap").unwrap();
    assert!(snapshot.is_ready());

    let content = client
        .get_snapshot_content("ns", snapshot.content_name().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(content.volumes_missing_backup().is_empty());

    let restore = VirtualMachineRestore::new(
        "restore",
        VirtualMachineRestoreSpec {
            target: TypedReference::virtual_machine("target"),
            virtual_machine_snapshot_name: "snap".to_string(),
            ..Default::default()
        },
    );
    client.create_restore("ns", &restore).await.unwrap();
    assert!(client.complete_restore("ns", "restore"));
    assert!(client.restore("ns", "restore").unwrap().is_complete());

    let target = client.vm("ns", "target").unwrap();
    assert_eq!(target.spec, source_vm().spec);
    assert_eq!(target.metadata.labels, source_vm().metadata.labels);
    assert_ne!(target.metadata.uid, source_vm().metadata.uid);
}

#[tokio::test]
async fn test_create_conflicts_and_delete_not_found() {
    let client = MockVirtClient::new();
    let mut snapshot = VirtualMachineSnapshot::new("snap", VirtualMachineSnapshotSpec::default());
    snapshot.metadata.namespace = Some("ns".to_string());

    client.create_snapshot("ns", &snapshot).await.unwrap();
    let err = client.create_snapshot("ns", &snapshot).await.unwrap_err();
    assert!(err.is_already_exists());

    client.delete_snapshot("ns", "snap").await.unwrap();
    let err = client.delete_snapshot("ns", "snap").await.unwrap_err();
    assert!(err.is_not_found());

    let calls = client.calls();
    assert_eq!(calls.snapshots_created, 1);
    assert_eq!(calls.snapshots_deleted, 1);
}

#[tokio::test]
async fn test_patch_vm_merges() {
    let client = MockVirtClient::new();
    client.add_vm(source_vm());

    let patched = client
        .patch_vm(
            "ns",
            "source",
            &json!({ "metadata": { "labels": { "app": null, "tier": "gold" } } }),
        )
        .await
        .unwrap();

    let labels = patched.metadata.labels.unwrap();
    assert_eq!(labels.get("tier").map(String::as_str), Some("gold"));
    assert!(!labels.contains_key("app"));
    assert_eq!(client.calls().vm_patches, 1);
}

#[tokio::test]
async fn test_failing_deletes_keep_objects() {
    let client = MockVirtClient::new();
    let mut snapshot = VirtualMachineSnapshot::new("snap", VirtualMachineSnapshotSpec::default());
    snapshot.metadata.namespace = Some("ns".to_string());
    client.add_snapshot(snapshot);
    client.set_fail_deletes(true);

    assert!(client.delete_snapshot("ns", "snap").await.is_err());
    assert!(client.snapshot("ns", "snap").is_some());
}
