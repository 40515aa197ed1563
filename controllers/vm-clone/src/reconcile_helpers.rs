//! Helper functions for building and comparing clone status
//!
//! Status is written as a JSON merge patch. Fields that must disappear are
//! sent as `null`, so clearing `snapshotName` after cleanup is a plain patch.

use crate::phase::{Progress, REASON_SUCCEEDED};
use crds::{
    conditions_equal, merge_conditions, ClonePhase, Condition, ConditionStatus,
    VirtualMachineCloneStatus, CONDITION_PROGRESSING, CONDITION_READY,
};
use kube::{Resource, ResourceExt};

/// `namespace/name` key used for per-resource bookkeeping
pub fn resource_key<K: Resource>(resource: &K) -> String {
    format!(
        "{}/{}",
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    )
}

/// Builds the status merge patch for a clone request
pub fn create_clone_status_patch(status: &VirtualMachineCloneStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "phase": status.phase.as_str(),
            "snapshotName": status.snapshot_name,
            "restoreName": status.restore_name,
            "targetName": status.target_name,
            "conditions": status.conditions,
        }
    })
}

/// Whether `desired` differs from the current status in anything but
/// condition timestamps
pub fn status_needs_update(
    current: Option<&VirtualMachineCloneStatus>,
    desired: &VirtualMachineCloneStatus,
) -> bool {
    let Some(current) = current else {
        return true;
    };
    current.phase != desired.phase
        || current.snapshot_name != desired.snapshot_name
        || current.restore_name != desired.restore_name
        || current.target_name != desired.target_name
        || !conditions_equal(&current.conditions, &desired.conditions)
}

/// Ready and Progressing conditions describing `progress`
pub fn conditions_for(progress: &Progress) -> Vec<Condition> {
    match progress {
        Progress::Advancing { reason, message } | Progress::Waiting { reason, message } => vec![
            Condition::new(CONDITION_READY, ConditionStatus::False, reason.as_str(), message.as_str()),
            Condition::new(CONDITION_PROGRESSING, ConditionStatus::True, reason.as_str(), message.as_str()),
        ],
        Progress::Failed { reason, message } => vec![
            Condition::new(CONDITION_READY, ConditionStatus::False, reason.as_str(), message.as_str()),
            Condition::new(CONDITION_PROGRESSING, ConditionStatus::False, reason.as_str(), message.as_str()),
        ],
        Progress::Completed => vec![
            Condition::new(CONDITION_READY, ConditionStatus::True, REASON_SUCCEEDED, "clone completed"),
            Condition::new(CONDITION_PROGRESSING, ConditionStatus::False, REASON_SUCCEEDED, "clone completed"),
        ],
    }
}

/// Desired status: the decision's fields plus conditions merged with the
/// existing ones so unchanged conditions keep their transition time
pub fn desired_status(
    current: Option<&VirtualMachineCloneStatus>,
    phase: ClonePhase,
    snapshot_name: Option<String>,
    restore_name: Option<String>,
    target_name: Option<String>,
    progress: &Progress,
) -> VirtualMachineCloneStatus {
    let existing = current.map(|s| s.conditions.as_slice()).unwrap_or_default();
    VirtualMachineCloneStatus {
        phase,
        snapshot_name,
        restore_name,
        target_name,
        conditions: merge_conditions(existing, conditions_for(progress)),
    }
}
