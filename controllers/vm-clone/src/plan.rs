//! Validated view of a clone request.
//!
//! `ClonePlan::from_clone` checks the request before any side effect and
//! derives every name the controller will use. All names are computed from
//! the clone's UID so a reconcile that runs twice (or after a crash) lands on
//! the same objects.

use crate::error::ControllerError;
use crds::VirtualMachineClone;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Maximum length of a Kubernetes object name (DNS subdomain)
pub const MAX_NAME_LENGTH: usize = 253;

const UID_PREFIX_LENGTH: usize = 8;

/// What the clone is made from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSource {
    /// A live VirtualMachine; the controller snapshots it itself
    VirtualMachine(String),
    /// A user-supplied VirtualMachineSnapshot; borrowed, never owned
    Snapshot(String),
}

impl CloneSource {
    pub fn name(&self) -> &str {
        match self {
            CloneSource::VirtualMachine(name) | CloneSource::Snapshot(name) => name,
        }
    }

    pub fn is_virtual_machine(&self) -> bool {
        matches!(self, CloneSource::VirtualMachine(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClonePlan {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub source: CloneSource,
    pub target_name: String,
    /// Snapshot the controller creates; `None` for snapshot sources
    pub owned_snapshot_name: Option<String>,
    pub restore_name: String,
    pub owner_reference: OwnerReference,
}

impl ClonePlan {
    /// Validates `clone` and derives the names of its dependents.
    ///
    /// Problems with the request itself yield `InvalidSpec`. Missing
    /// server-populated metadata yields `Reconciliation`.
    pub fn from_clone(clone: &VirtualMachineClone) -> Result<Self, ControllerError> {
        let name = clone.name_any();
        let namespace = clone.namespace().ok_or_else(|| {
            ControllerError::Reconciliation(format!("VirtualMachineClone {} has no namespace", name))
        })?;
        let uid = clone.uid().ok_or_else(|| {
            ControllerError::Reconciliation(format!(
                "VirtualMachineClone {}/{} has no uid",
                namespace, name
            ))
        })?;
        let owner_reference = clone.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::Reconciliation(format!(
                "VirtualMachineClone {}/{} cannot be referenced as an owner",
                namespace, name
            ))
        })?;

        let spec = &clone.spec;
        if spec.source.name.is_empty() {
            return Err(ControllerError::InvalidSpec("source name must not be empty".to_string()));
        }
        let source = if spec.source.is_virtual_machine() {
            CloneSource::VirtualMachine(spec.source.name.clone())
        } else if spec.source.is_snapshot() {
            CloneSource::Snapshot(spec.source.name.clone())
        } else {
            return Err(ControllerError::InvalidSpec(format!(
                "unsupported source {}: must be a VirtualMachine or VirtualMachineSnapshot",
                spec.source
            )));
        };

        if let Some(target) = &spec.target {
            if !target.is_virtual_machine() {
                return Err(ControllerError::InvalidSpec(format!(
                    "unsupported target {}: must be a VirtualMachine",
                    target
                )));
            }
            if target.name.is_empty() {
                return Err(ControllerError::InvalidSpec("target name must not be empty".to_string()));
            }
        }

        if spec.new_mac_addresses.keys().any(|iface| iface.is_empty()) {
            return Err(ControllerError::InvalidSpec(
                "newMacAddresses contains an empty interface name".to_string(),
            ));
        }
        validate_filters("labelFilters", &spec.label_filters)?;
        validate_filters("annotationFilters", &spec.annotation_filters)?;

        let target_name = clone
            .status
            .as_ref()
            .and_then(|s| s.target_name.clone())
            .or_else(|| spec.target.as_ref().map(|t| t.name.clone()))
            .unwrap_or_else(|| {
                name_with_suffix(source.name(), &format!("-clone-{}", uid_prefix(&uid)))
            });

        let owned_snapshot_name = source
            .is_virtual_machine()
            .then(|| snapshot_name_for(&uid));

        Ok(Self {
            restore_name: restore_name_for(&uid),
            namespace,
            name,
            uid,
            source,
            target_name,
            owned_snapshot_name,
            owner_reference,
        })
    }

    /// Snapshot the restore reads from: the owned one, or the borrowed source
    pub fn restore_snapshot_name(&self) -> &str {
        match &self.owned_snapshot_name {
            Some(owned) => owned,
            None => self.source.name(),
        }
    }

    /// `namespace/name` of the clone request
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

fn validate_filters(field: &str, patterns: &[String]) -> Result<(), ControllerError> {
    match patterns.iter().find(|p| p.is_empty() || p.as_str() == "!") {
        Some(bad) => Err(ControllerError::InvalidSpec(format!(
            "{} contains an empty pattern {:?}",
            field, bad
        ))),
        None => Ok(()),
    }
}

pub fn snapshot_name_for(uid: &str) -> String {
    format!("tmp-snapshot-{}", uid)
}

pub fn restore_name_for(uid: &str) -> String {
    format!("tmp-restore-{}", uid)
}

/// Name of the target-owned copy of a ControllerRevision.
///
/// `matcher` is `instancetype` or `preference`.
pub fn duplicate_revision_name(target: &str, matcher: &str, uid: &str) -> String {
    name_with_suffix(target, &format!("-{}-clone-{}", matcher, uid_prefix(uid)))
}

fn uid_prefix(uid: &str) -> &str {
    uid.get(..UID_PREFIX_LENGTH).unwrap_or(uid)
}

/// Appends `suffix` to `base`, shortening only `base` so the result fits
/// the Kubernetes name limit. The suffix always survives intact.
pub fn name_with_suffix(base: &str, suffix: &str) -> String {
    let budget = MAX_NAME_LENGTH.saturating_sub(suffix.len());
    if base.len() <= budget {
        return format!("{}{}", base, suffix);
    }
    let mut end = budget;
    while !base.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", base[..end].trim_end_matches(['-', '.']), suffix)
}
