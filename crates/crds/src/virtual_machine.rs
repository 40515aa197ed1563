//! KubeVirt VirtualMachine
//!
//! Only the fields the clone controller reads or patches are typed. Everything
//! else is kept in flattened maps so a read-modify-patch cycle never drops data.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Unknown fields preserved verbatim
pub type ExtraFields = BTreeMap<String, Value>;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    namespaced,
    status = "VirtualMachineStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<VirtualMachineInstanceTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instancetype: Option<RevisionMatcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<RevisionMatcher>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<VirtualMachineInstanceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    #[serde(default)]
    pub domain: DomainSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default)]
    pub devices: Devices,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<Firmware>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// SMBIOS-visible firmware identity
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimVolumeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_volume: Option<DataVolumeSource>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Volume {
    /// Name of the PersistentVolumeClaim backing this volume, if any.
    ///
    /// DataVolumes provision a claim with the same name.
    pub fn claim_name(&self) -> Option<&str> {
        if let Some(pvc) = &self.persistent_volume_claim {
            return Some(pvc.claim_name.as_str());
        }
        self.data_volume.as_ref().map(|dv| dv.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVolumeSource {
    pub claim_name: String,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeSource {
    pub name: String,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Instancetype or preference matcher. `revisionName` pins a ControllerRevision.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printable_status: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VirtualMachineSpec {
    /// Instance spec inside the template, if present
    pub fn instance_spec(&self) -> Option<&VirtualMachineInstanceSpec> {
        self.template.as_ref().and_then(|t| t.spec.as_ref())
    }

    /// Volumes backed by a PersistentVolumeClaim or DataVolume
    pub fn claim_volumes(&self) -> Vec<&Volume> {
        self.instance_spec()
            .map(|s| s.volumes.iter().filter(|v| v.claim_name().is_some()).collect())
            .unwrap_or_default()
    }

    /// Network interfaces declared on the domain
    pub fn interfaces(&self) -> &[Interface] {
        self.instance_spec()
            .map(|s| s.domain.devices.interfaces.as_slice())
            .unwrap_or_default()
    }

    /// Firmware block declared on the domain
    pub fn firmware(&self) -> Option<&Firmware> {
        self.instance_spec().and_then(|s| s.domain.firmware.as_ref())
    }
}

/// VirtualMachine as embedded in snapshot content: metadata plus spec.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedVirtualMachine {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: VirtualMachineSpec,

    #[serde(flatten)]
    pub extra: ExtraFields,
}
