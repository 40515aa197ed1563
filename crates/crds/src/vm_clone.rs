//! VirtualMachineClone CRD
//!
//! Declarative request to clone a virtual machine (or a snapshot of one)
//! into a new, independent virtual machine.

use crate::condition::Condition;
use crate::references::TypedReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "clone.kubevirt.io",
    version = "v1alpha1",
    kind = "VirtualMachineClone",
    namespaced,
    status = "VirtualMachineCloneStatus",
    shortname = "vmclone",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"SourceVirtualMachine","type":"string","jsonPath":".spec.source.name"}"#,
    printcolumn = r#"{"name":"TargetVirtualMachine","type":"string","jsonPath":".status.targetName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCloneSpec {
    /// Source of the clone: a VirtualMachine or a VirtualMachineSnapshot
    pub source: TypedReference,

    /// Target VirtualMachine (a name is generated when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TypedReference>,

    /// Ordered glob patterns selecting which source labels the target keeps.
    /// A leading `!` excludes; the last matching pattern wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_filters: Vec<String>,

    /// Ordered glob patterns selecting which source annotations the target keeps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotation_filters: Vec<String>,

    /// Interface name to MAC address overrides for the target
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_mac_addresses: BTreeMap<String, String>,

    /// SMBIOS serial for the target firmware
    #[serde(
        rename = "newSMBiosSerial",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub new_sm_bios_serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCloneStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: ClonePhase,

    /// Snapshot created and owned by the clone (unset for snapshot sources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,

    /// Restore created and owned by the clone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_name: Option<String>,

    /// Name of the target VirtualMachine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Clone lifecycle phase
///
/// Serializes as PascalCase. An empty string deserializes as `Pending`
/// since freshly created requests carry no phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ClonePhase {
    /// Request accepted, nothing created yet
    #[default]
    #[serde(alias = "")]
    Pending,

    /// Waiting for the owned snapshot of the source VM
    SnapshotInProgress,

    /// Waiting for the restore that materializes the target VM
    RestoreInProgress,

    /// Target VM created and transformed
    Succeeded,

    /// Clone failed permanently
    Failed,
}

impl ClonePhase {
    /// Terminal phases are never left once entered
    pub fn is_terminal(self) -> bool {
        matches!(self, ClonePhase::Succeeded | ClonePhase::Failed)
    }

    /// Wire name of the phase
    pub fn as_str(self) -> &'static str {
        match self {
            ClonePhase::Pending => "Pending",
            ClonePhase::SnapshotInProgress => "SnapshotInProgress",
            ClonePhase::RestoreInProgress => "RestoreInProgress",
            ClonePhase::Succeeded => "Succeeded",
            ClonePhase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ClonePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VirtualMachineClone {
    /// Minimal clone request: a named object with an empty spec, to be
    /// completed with the builder methods below.
    pub fn new_minimal(name: &str, namespace: &str) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: VirtualMachineCloneSpec::default(),
            status: None,
        }
    }

    /// Use a VirtualMachine as the source
    pub fn from_vm(mut self, vm_name: &str) -> Self {
        self.spec.source = TypedReference::virtual_machine(vm_name);
        self
    }

    /// Use a VirtualMachineSnapshot as the source
    pub fn from_snapshot(mut self, snapshot_name: &str) -> Self {
        self.spec.source = TypedReference::snapshot(snapshot_name);
        self
    }

    /// Name the target VirtualMachine
    pub fn with_target(mut self, vm_name: &str) -> Self {
        self.spec.target = Some(TypedReference::virtual_machine(vm_name));
        self
    }

    /// Current phase, `Pending` when no status was written yet
    pub fn phase(&self) -> ClonePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_phase_deserializes_as_pending() {
        let status: VirtualMachineCloneStatus =
            serde_json::from_value(serde_json::json!({ "phase": "" })).unwrap();
        assert_eq!(status.phase, ClonePhase::Pending);

        let status: VirtualMachineCloneStatus =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(status.phase, ClonePhase::Pending);
    }

    #[test]
    fn test_spec_wire_names() {
        let mut clone = VirtualMachineClone::new_minimal("testclone", "ns")
            .from_vm("source")
            .with_target("target");
        clone.spec.new_sm_bios_serial = Some("serial".to_string());
        clone
            .spec
            .new_mac_addresses
            .insert("eth0".to_string(), "BE-AD-00-00-BE-04".to_string());

        let value = serde_json::to_value(&clone.spec).unwrap();
        assert_eq!(value["source"]["apiGroup"], "kubevirt.io");
        assert_eq!(value["target"]["name"], "target");
        assert_eq!(value["newSMBiosSerial"], "serial");
        assert_eq!(value["newMacAddresses"]["eth0"], "BE-AD-00-00-BE-04");
        assert!(value.get("labelFilters").is_none());
    }

    #[test]
    fn test_phase_terminal() {
        assert!(ClonePhase::Succeeded.is_terminal());
        assert!(ClonePhase::Failed.is_terminal());
        assert!(!ClonePhase::Pending.is_terminal());
        assert!(!ClonePhase::RestoreInProgress.is_terminal());
    }

    #[test]
    fn test_target_column_reads_resolved_name() {
        use kube::CustomResourceExt;

        let crd = VirtualMachineClone::crd();
        let columns = crd.spec.versions[0]
            .additional_printer_columns
            .clone()
            .unwrap_or_default();
        let target = columns
            .iter()
            .find(|c| c.name == "TargetVirtualMachine")
            .unwrap();
        assert_eq!(target.json_path, ".status.targetName");
    }

    #[test]
    fn test_phase_defaults_without_status() {
        let clone = VirtualMachineClone::new_minimal("c", "ns").from_snapshot("snap");
        assert_eq!(clone.phase(), ClonePhase::Pending);
        assert!(clone.spec.source.is_snapshot());
    }
}
