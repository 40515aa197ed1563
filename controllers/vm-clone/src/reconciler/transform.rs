//! Spec transformer
//!
//! After the restore completes the target is a copy of the source. This
//! module turns it into an independent VM with a single JSON merge patch:
//! filtered labels and annotations, requested MAC addresses and SMBIOS
//! serial, a fresh firmware UUID, and instancetype/preference revisions
//! pointing at target-owned copies.
//!
//! The patch is computed from the target's current state, so running it a
//! second time yields an empty patch and no API call.

use super::Reconciler;
use crate::error::ControllerError;
use crate::filters::KeyFilter;
use crate::plan::{duplicate_revision_name, ClonePlan};
use crds::{RevisionMatcher, VirtualMachine, VirtualMachineClone, VirtualMachineCloneSpec};
use k8s_openapi::api::apps::v1::ControllerRevision;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

pub const INSTANCETYPE_MATCHER: &str = "instancetype";
pub const PREFERENCE_MATCHER: &str = "preference";

/// Firmware UUID of the target. Derived from the clone so it is stable
/// across reconciles.
pub fn firmware_uuid(plan: &ClonePlan) -> String {
    let seed = format!("{}/{}/{}", plan.uid, plan.namespace, plan.target_name);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

/// Revision names the target should point at once duplicated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionNames {
    pub instancetype: Option<String>,
    pub preference: Option<String>,
}

/// Keys to remove: present on the target, not kept by `filters`, not ignored
fn removed_keys(
    current: Option<&BTreeMap<String, String>>,
    filters: &[String],
    ignored: &KeyFilter,
) -> Map<String, Value> {
    let filter = KeyFilter::new(filters);
    current
        .into_iter()
        .flatten()
        .filter(|(key, _)| !ignored.selects(key) && !filter.keeps(key))
        .map(|(key, _)| (key.clone(), Value::Null))
        .collect()
}

/// Computes the merge patch that makes `target` independent of its source.
///
/// Returns `Ok(None)` when the target already matches.
pub fn build_target_patch(
    target: &VirtualMachine,
    spec: &VirtualMachineCloneSpec,
    ignored: &KeyFilter,
    firmware_uuid: &str,
    revisions: &RevisionNames,
) -> Result<Option<Value>, ControllerError> {
    let mut metadata = Map::new();
    let labels = removed_keys(target.metadata.labels.as_ref(), &spec.label_filters, ignored);
    if !labels.is_empty() {
        metadata.insert("labels".to_string(), Value::Object(labels));
    }
    let annotations = removed_keys(
        target.metadata.annotations.as_ref(),
        &spec.annotation_filters,
        ignored,
    );
    if !annotations.is_empty() {
        metadata.insert("annotations".to_string(), Value::Object(annotations));
    }

    let mut domain = Map::new();
    if let Some(interfaces) = interfaces_patch(target, &spec.new_mac_addresses)? {
        domain.insert("devices".to_string(), json!({ "interfaces": interfaces }));
    }
    if let Some(firmware) = firmware_patch(target, spec.new_sm_bios_serial.as_deref(), firmware_uuid) {
        domain.insert("firmware".to_string(), firmware);
    }

    let mut vm_spec = Map::new();
    if !domain.is_empty() {
        vm_spec.insert("template".to_string(), json!({ "spec": { "domain": domain } }));
    }
    for (field, matcher, wanted) in [
        (INSTANCETYPE_MATCHER, target.spec.instancetype.as_ref(), revisions.instancetype.as_deref()),
        (PREFERENCE_MATCHER, target.spec.preference.as_ref(), revisions.preference.as_deref()),
    ] {
        let current = matcher.and_then(|m| m.revision_name.as_deref());
        if let Some(wanted) = wanted {
            if current != Some(wanted) {
                vm_spec.insert(field.to_string(), json!({ "revisionName": wanted }));
            }
        }
    }

    let mut patch = Map::new();
    if !metadata.is_empty() {
        patch.insert("metadata".to_string(), Value::Object(metadata));
    }
    if !vm_spec.is_empty() {
        patch.insert("spec".to_string(), Value::Object(vm_spec));
    }
    Ok((!patch.is_empty()).then_some(Value::Object(patch)))
}

/// Full interface list with requested MACs, or `None` if nothing changes
fn interfaces_patch(
    target: &VirtualMachine,
    new_macs: &BTreeMap<String, String>,
) -> Result<Option<Value>, ControllerError> {
    if new_macs.is_empty() {
        return Ok(None);
    }
    let mut interfaces = target.spec.interfaces().to_vec();
    let mut changed = false;
    for (name, mac) in new_macs {
        let Some(interface) = interfaces.iter_mut().find(|i| &i.name == name) else {
            return Err(ControllerError::Transform(format!(
                "interface {} not found in target virtual machine {}",
                name,
                target.metadata.name.as_deref().unwrap_or_default()
            )));
        };
        if interface.mac_address.as_deref() != Some(mac.as_str()) {
            interface.mac_address = Some(mac.clone());
            changed = true;
        }
    }
    if !changed {
        return Ok(None);
    }
    Ok(Some(serde_json::to_value(interfaces)?))
}

/// Firmware fields to change, or `None` if nothing changes.
///
/// An existing UUID is always replaced; a missing one is not added.
fn firmware_patch(target: &VirtualMachine, new_serial: Option<&str>, uuid: &str) -> Option<Value> {
    let firmware = target.spec.firmware();
    let mut patch = Map::new();

    if let Some(current) = firmware.and_then(|f| f.uuid.as_deref()) {
        if current != uuid {
            patch.insert("uuid".to_string(), Value::String(uuid.to_string()));
        }
    }
    if let Some(serial) = new_serial {
        if firmware.and_then(|f| f.serial.as_deref()) != Some(serial) {
            patch.insert("serial".to_string(), Value::String(serial.to_string()));
        }
    }

    (!patch.is_empty()).then_some(Value::Object(patch))
}

/// Whether `existing` is the target-owned copy of `source`
fn is_copy_for(existing: &ControllerRevision, source: &ControllerRevision, target: &VirtualMachine) -> bool {
    let owned_by_target = match target.metadata.uid.as_deref() {
        Some(uid) => existing.owner_references().iter().any(|owner| owner.uid == uid),
        None => false,
    };
    owned_by_target && existing.data == source.data
}

impl Reconciler {
    pub(crate) async fn transform_target(
        &self,
        plan: &ClonePlan,
        clone: &VirtualMachineClone,
    ) -> Result<(), ControllerError> {
        let ns = plan.namespace.as_str();
        let target = self.client.get_vm(ns, &plan.target_name).await?.ok_or_else(|| {
            ControllerError::Reconciliation(format!(
                "target VirtualMachine {}/{} disappeared before it was transformed",
                ns, plan.target_name
            ))
        })?;

        let revisions = RevisionNames {
            instancetype: self
                .duplicate_revision(plan, &target, INSTANCETYPE_MATCHER, target.spec.instancetype.as_ref())
                .await?,
            preference: self
                .duplicate_revision(plan, &target, PREFERENCE_MATCHER, target.spec.preference.as_ref())
                .await?,
        };

        let uuid = firmware_uuid(plan);
        match build_target_patch(&target, &clone.spec, &self.ignored_keys, &uuid, &revisions)? {
            Some(patch) => {
                self.client.patch_vm(ns, &plan.target_name, &patch).await?;
                info!("Transformed target VirtualMachine {}/{}", ns, plan.target_name);
            }
            None => debug!("Target VirtualMachine {}/{} already transformed", ns, plan.target_name),
        }
        Ok(())
    }

    /// Copies the revision pinned by `matcher` into a target-owned one.
    ///
    /// Returns the name the target should point at, or `None` when nothing
    /// is pinned.
    async fn duplicate_revision(
        &self,
        plan: &ClonePlan,
        target: &VirtualMachine,
        kind: &str,
        matcher: Option<&RevisionMatcher>,
    ) -> Result<Option<String>, ControllerError> {
        let Some(source_name) = matcher.and_then(|m| m.revision_name.as_deref()) else {
            return Ok(None);
        };
        let ns = plan.namespace.as_str();
        let duplicate_name = duplicate_revision_name(&plan.target_name, kind, &plan.uid);
        if source_name == duplicate_name {
            return Ok(Some(duplicate_name));
        }

        let source = self
            .client
            .get_controller_revision(ns, source_name)
            .await?
            .ok_or_else(|| {
                ControllerError::Reconciliation(format!(
                    "{} ControllerRevision {}/{} referenced by target {} not found",
                    kind, ns, source_name, plan.target_name
                ))
            })?;

        if let Some(existing) = self.client.get_controller_revision(ns, &duplicate_name).await? {
            if !is_copy_for(&existing, &source, target) {
                return Err(ControllerError::Transform(format!(
                    "ControllerRevision {} already exists and is not a copy of {} owned by target virtual machine {}",
                    duplicate_name, source_name, plan.target_name
                )));
            }
            debug!("ControllerRevision {}/{} already duplicated", ns, duplicate_name);
            return Ok(Some(duplicate_name));
        }

        let duplicate = ControllerRevision {
            metadata: ObjectMeta {
                name: Some(duplicate_name.clone()),
                namespace: Some(ns.to_string()),
                labels: source.metadata.labels.clone(),
                owner_references: target.controller_owner_ref(&()).map(|owner| vec![owner]),
                ..Default::default()
            },
            data: source.data.clone(),
            revision: source.revision,
        };
        match self.client.create_controller_revision(ns, &duplicate).await {
            Ok(_) => info!(
                "Duplicated {} ControllerRevision {}/{} as {}",
                kind, ns, source_name, duplicate_name
            ),
            Err(e) if e.is_already_exists() => {
                debug!("ControllerRevision {}/{} already exists", ns, duplicate_name)
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Some(duplicate_name))
    }
}
