//! Status conditions
//!
//! Standard Kubernetes-style conditions reported on `VirtualMachineClone` status.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reported once the clone has finished successfully.
pub const CONDITION_READY: &str = "Ready";

/// Condition type reported while the clone is advancing or waiting.
pub const CONDITION_PROGRESSING: &str = "Progressing";

/// Status of a condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition cannot be determined
    #[default]
    Unknown,
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, Progressing)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Compares everything except the transition timestamp
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Merges `desired` conditions over `existing` ones.
///
/// A condition whose state is unchanged keeps its original
/// `lastTransitionTime`, so writing the same conditions twice is a no-op.
/// Existing condition types not present in `desired` are kept.
pub fn merge_conditions(existing: &[Condition], desired: Vec<Condition>) -> Vec<Condition> {
    let mut merged: Vec<Condition> = existing
        .iter()
        .filter(|c| !desired.iter().any(|d| d.type_ == c.type_))
        .cloned()
        .collect();

    for condition in desired {
        match existing.iter().find(|c| c.type_ == condition.type_) {
            Some(previous) if previous.same_state(&condition) => merged.push(previous.clone()),
            _ => merged.push(condition),
        }
    }

    merged.sort_by(|a, b| a.type_.cmp(&b.type_));
    merged
}

/// Returns true when both condition lists describe the same state.
pub fn conditions_equal(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().all(|c| b.iter().any(|other| other.same_state(c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(condition: Condition, secs: i64) -> Condition {
        Condition {
            last_transition_time: Utc.timestamp_opt(secs, 0).single().unwrap(),
            ..condition
        }
    }

    #[test]
    fn test_merge_keeps_timestamp_for_unchanged_condition() {
        let old = at(
            Condition::new(CONDITION_READY, ConditionStatus::False, "Pending", "waiting"),
            100,
        );
        let merged = merge_conditions(
            &[old.clone()],
            vec![Condition::new(CONDITION_READY, ConditionStatus::False, "Pending", "waiting")],
        );
        assert_eq!(merged, vec![old]);
    }

    #[test]
    fn test_merge_replaces_changed_condition() {
        let old = at(
            Condition::new(CONDITION_READY, ConditionStatus::False, "Pending", "waiting"),
            100,
        );
        let merged = merge_conditions(
            &[old.clone()],
            vec![Condition::new(CONDITION_READY, ConditionStatus::True, "Succeeded", "done")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, ConditionStatus::True);
        assert_ne!(merged[0].last_transition_time, old.last_transition_time);
    }

    #[test]
    fn test_merge_keeps_unrelated_types_sorted() {
        let other = at(Condition::new("External", ConditionStatus::True, "X", ""), 5);
        let merged = merge_conditions(
            &[other],
            vec![Condition::new(CONDITION_PROGRESSING, ConditionStatus::True, "A", "")],
        );
        let types: Vec<&str> = merged.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(types, vec!["External", "Progressing"]);
    }

    #[test]
    fn test_conditions_equal_ignores_timestamps() {
        let a = at(Condition::new(CONDITION_READY, ConditionStatus::True, "R", "m"), 1);
        let b = at(Condition::new(CONDITION_READY, ConditionStatus::True, "R", "m"), 2);
        assert!(conditions_equal(&[a.clone()], &[b]));
        assert!(!conditions_equal(&[a], &[]));
    }
}
