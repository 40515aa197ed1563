//! Typed object references for clone sources and targets
//!
//! Follows the Kubernetes `TypedLocalObjectReference` pattern: an optional
//! `apiGroup`, a `kind` and a `name` within the referencing object's namespace.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of KubeVirt virtual machines.
pub const KUBEVIRT_API_GROUP: &str = "kubevirt.io";

/// API group of KubeVirt snapshots and restores.
pub const SNAPSHOT_API_GROUP: &str = "snapshot.kubevirt.io";

/// Kind name of a virtual machine.
pub const VIRTUAL_MACHINE_KIND: &str = "VirtualMachine";

/// Kind name of a virtual machine snapshot.
pub const VIRTUAL_MACHINE_SNAPSHOT_KIND: &str = "VirtualMachineSnapshot";

/// Reference to an object in the same namespace as the referencing resource.
///
/// `apiGroup` may be omitted, in which case the group implied by `kind` is
/// assumed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypedReference {
    /// API group of the referenced resource (e.g., "kubevirt.io")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    /// Kind of the referenced resource (e.g., "VirtualMachine")
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,
}

impl TypedReference {
    /// Create a reference with an explicit API group
    pub fn new(api_group: Option<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_group,
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Reference to a `kubevirt.io` VirtualMachine
    pub fn virtual_machine(name: impl Into<String>) -> Self {
        Self::new(Some(KUBEVIRT_API_GROUP.to_string()), VIRTUAL_MACHINE_KIND, name)
    }

    /// Reference to a `snapshot.kubevirt.io` VirtualMachineSnapshot
    pub fn snapshot(name: impl Into<String>) -> Self {
        Self::new(
            Some(SNAPSHOT_API_GROUP.to_string()),
            VIRTUAL_MACHINE_SNAPSHOT_KIND,
            name,
        )
    }

    /// True when this reference names a VirtualMachine in an accepted group
    pub fn is_virtual_machine(&self) -> bool {
        self.kind == VIRTUAL_MACHINE_KIND && self.group_matches(KUBEVIRT_API_GROUP)
    }

    /// True when this reference names a VirtualMachineSnapshot in an accepted group
    pub fn is_snapshot(&self) -> bool {
        self.kind == VIRTUAL_MACHINE_SNAPSHOT_KIND && self.group_matches(SNAPSHOT_API_GROUP)
    }

    fn group_matches(&self, expected: &str) -> bool {
        match self.api_group.as_deref() {
            None | Some("") => true,
            Some(group) => group == expected,
        }
    }
}

impl std::fmt::Display for TypedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.api_group.as_deref() {
            Some(group) if !group.is_empty() => write!(f, "{}.{}/{}", self.kind, group, self.name),
            _ => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_checks_accept_missing_group() {
        let vm = TypedReference::new(None, "VirtualMachine", "fedora");
        assert!(vm.is_virtual_machine());
        assert!(!vm.is_snapshot());

        let snap = TypedReference::new(Some(String::new()), "VirtualMachineSnapshot", "snap");
        assert!(snap.is_snapshot());
    }

    #[test]
    fn test_kind_checks_reject_wrong_group() {
        let vm = TypedReference::new(Some("apps".to_string()), "VirtualMachine", "fedora");
        assert!(!vm.is_virtual_machine());

        let snap = TypedReference::new(
            Some(KUBEVIRT_API_GROUP.to_string()),
            "VirtualMachineSnapshot",
            "snap",
        );
        assert!(!snap.is_snapshot());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TypedReference::virtual_machine("fedora").to_string(),
            "VirtualMachine.kubevirt.io/fedora"
        );
        assert_eq!(
            TypedReference::new(None, "VirtualMachine", "fedora").to_string(),
            "VirtualMachine/fedora"
        );
    }
}
