//! Clone phase state machine.
//!
//! `decide` is a pure function from a fresh observation of the cluster to the
//! next phase and the side effects needed to get there. The reconciler runs
//! the effects; nothing here talks to the API server, so every branch is
//! covered by plain unit tests (see `phase_test.rs`).
//!
//! ```text
//! Pending ──(vm source)──> SnapshotInProgress ──> RestoreInProgress ──> Succeeded
//!    └──────(snapshot source)───────────────────────────┘
//! any non-terminal phase ──> Failed
//! ```

use crate::plan::{ClonePlan, CloneSource};
use crds::ClonePhase;

pub const REASON_SNAPSHOT_IN_PROGRESS: &str = "SnapshotInProgress";
pub const REASON_RESTORE_IN_PROGRESS: &str = "RestoreInProgress";
pub const REASON_SUCCEEDED: &str = "Succeeded";
pub const REASON_SOURCE_NOT_FOUND: &str = "SourceNotFound";
pub const REASON_SNAPSHOT_NOT_READY: &str = "SnapshotNotReady";
pub const REASON_CONTENT_NOT_FOUND: &str = "SnapshotContentNotFound";
pub const REASON_RESTORE_NOT_COMPLETE: &str = "RestoreNotComplete";
pub const REASON_TARGET_NOT_FOUND: &str = "TargetNotFound";
pub const REASON_TARGET_EXISTS: &str = "TargetExists";
pub const REASON_SNAPSHOT_UNSUPPORTED: &str = "VolumeSnapshotUnsupported";
pub const REASON_VOLUME_NOT_BACKED_UP: &str = "VolumeNotBackedUp";
pub const REASON_SNAPSHOT_DELETED: &str = "SnapshotDeleted";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
pub const REASON_TRANSFORM_FAILED: &str = "TransformFailed";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";

/// Snapshot as seen by the state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotView {
    pub ready: bool,
    pub content_name: Option<String>,
}

/// Restore as seen by the state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreView {
    pub complete: bool,
}

/// Everything `decide` needs, read fresh on every reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub phase: ClonePhase,
    /// The source VM, or the borrowed source snapshot
    pub source_exists: bool,
    pub target_exists: bool,
    /// The owned snapshot for VM sources, the borrowed one otherwise
    pub snapshot: Option<SnapshotView>,
    pub content_exists: bool,
    /// Claim-backed volumes in the snapshot content without a backup
    pub missing_backups: Vec<String>,
    /// Source VM volumes whose storage cannot be snapshotted
    pub unsupported_volumes: Vec<String>,
    pub restore: Option<RestoreView>,
    pub recorded_snapshot: Option<String>,
    pub recorded_restore: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    CreateSnapshot,
    CreateRestore,
    TransformTarget,
    Cleanup,
}

/// How the request is doing, mapped onto status conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A step was taken or the phase moved forward
    Advancing { reason: String, message: String },
    /// Blocked on something outside the controller
    Waiting { reason: String, message: String },
    Failed { reason: String, message: String },
    Completed,
}

impl Progress {
    pub fn reason(&self) -> &str {
        match self {
            Progress::Advancing { reason, .. }
            | Progress::Waiting { reason, .. }
            | Progress::Failed { reason, .. } => reason,
            Progress::Completed => REASON_SUCCEEDED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub phase: ClonePhase,
    pub effects: Vec<SideEffect>,
    pub progress: Progress,
    /// Owned snapshot name to record in status
    pub snapshot_name: Option<String>,
    pub restore_name: Option<String>,
}

impl Decision {
    fn advance(plan: &ClonePlan, phase: ClonePhase, effects: Vec<SideEffect>, reason: &str, message: String) -> Self {
        let (snapshot_name, restore_name) = names_for(plan, phase);
        Self {
            phase,
            effects,
            progress: Progress::Advancing { reason: reason.to_string(), message },
            snapshot_name,
            restore_name,
        }
    }

    fn wait(plan: &ClonePlan, obs: &Observation, reason: &str, message: String) -> Self {
        let (snapshot_name, restore_name) = names_for(plan, obs.phase);
        Self {
            phase: obs.phase,
            effects: Vec::new(),
            progress: Progress::Waiting { reason: reason.to_string(), message },
            snapshot_name,
            restore_name,
        }
    }

    fn complete(plan: &ClonePlan) -> Self {
        let (snapshot_name, restore_name) = names_for(plan, ClonePhase::Succeeded);
        Self {
            phase: ClonePhase::Succeeded,
            effects: vec![SideEffect::TransformTarget, SideEffect::Cleanup],
            progress: Progress::Completed,
            snapshot_name,
            restore_name,
        }
    }

    /// Failure keeps whatever names were already recorded
    pub fn fail(obs: &Observation, reason: &str, message: String) -> Self {
        Self {
            phase: ClonePhase::Failed,
            effects: Vec::new(),
            progress: Progress::Failed { reason: reason.to_string(), message },
            snapshot_name: obs.recorded_snapshot.clone(),
            restore_name: obs.recorded_restore.clone(),
        }
    }
}

/// Names that belong in status once the request has reached `phase`
fn names_for(plan: &ClonePlan, phase: ClonePhase) -> (Option<String>, Option<String>) {
    match phase {
        ClonePhase::Pending | ClonePhase::Failed => (None, None),
        ClonePhase::SnapshotInProgress => (plan.owned_snapshot_name.clone(), None),
        ClonePhase::RestoreInProgress | ClonePhase::Succeeded => {
            (plan.owned_snapshot_name.clone(), Some(plan.restore_name.clone()))
        }
    }
}

/// Whether the state machine allows moving from `from` to `to`
pub fn is_valid_transition(from: ClonePhase, to: ClonePhase) -> bool {
    use ClonePhase::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Pending, SnapshotInProgress)
            | (Pending, RestoreInProgress)
            | (SnapshotInProgress, RestoreInProgress)
            | (RestoreInProgress, Succeeded)
            | (Pending | SnapshotInProgress | RestoreInProgress, Failed)
    )
}

/// Computes the next step for a clone request
pub fn decide(plan: &ClonePlan, obs: &Observation) -> Decision {
    match obs.phase {
        ClonePhase::Pending => decide_pending(plan, obs),
        ClonePhase::SnapshotInProgress => decide_snapshotting(plan, obs),
        ClonePhase::RestoreInProgress => decide_restoring(plan, obs),
        ClonePhase::Succeeded => {
            let effects = if obs.recorded_snapshot.is_some() || obs.recorded_restore.is_some() {
                vec![SideEffect::Cleanup]
            } else {
                Vec::new()
            };
            Decision {
                phase: ClonePhase::Succeeded,
                effects,
                progress: Progress::Completed,
                snapshot_name: obs.recorded_snapshot.clone(),
                restore_name: obs.recorded_restore.clone(),
            }
        }
        ClonePhase::Failed => Decision {
            phase: ClonePhase::Failed,
            effects: Vec::new(),
            progress: Progress::Failed {
                reason: String::new(),
                message: String::new(),
            },
            snapshot_name: obs.recorded_snapshot.clone(),
            restore_name: obs.recorded_restore.clone(),
        },
    }
}

fn decide_pending(plan: &ClonePlan, obs: &Observation) -> Decision {
    if obs.restore.is_some() {
        return Decision::advance(
            plan,
            ClonePhase::RestoreInProgress,
            Vec::new(),
            REASON_RESTORE_IN_PROGRESS,
            format!("restore {} already exists", plan.restore_name),
        );
    }

    match &plan.source {
        CloneSource::VirtualMachine(source) => {
            if obs.snapshot.is_some() {
                return Decision::advance(
                    plan,
                    ClonePhase::SnapshotInProgress,
                    Vec::new(),
                    REASON_SNAPSHOT_IN_PROGRESS,
                    format!("snapshot {} already exists", plan.restore_snapshot_name()),
                );
            }
            if obs.target_exists {
                return target_exists(plan, obs);
            }
            if !obs.source_exists {
                return Decision::wait(
                    plan,
                    obs,
                    REASON_SOURCE_NOT_FOUND,
                    format!("source virtual machine {} does not exist", source),
                );
            }
            if !obs.unsupported_volumes.is_empty() {
                let message = obs
                    .unsupported_volumes
                    .iter()
                    .map(|volume| {
                        format!("volume {} of virtual machine {} does not support snapshots", volume, source)
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                return Decision::fail(obs, REASON_SNAPSHOT_UNSUPPORTED, message);
            }
            Decision::advance(
                plan,
                ClonePhase::SnapshotInProgress,
                vec![SideEffect::CreateSnapshot],
                REASON_SNAPSHOT_IN_PROGRESS,
                format!("creating snapshot of virtual machine {}", source),
            )
        }
        CloneSource::Snapshot(source) => {
            if obs.target_exists {
                return target_exists(plan, obs);
            }
            if !obs.source_exists {
                return Decision::wait(
                    plan,
                    obs,
                    REASON_SOURCE_NOT_FOUND,
                    format!("source snapshot {} does not exist", source),
                );
            }
            if !obs.content_exists {
                return Decision::wait(
                    plan,
                    obs,
                    REASON_CONTENT_NOT_FOUND,
                    format!("snapshot {} has no content yet", source),
                );
            }
            if !obs.missing_backups.is_empty() {
                let message = obs
                    .missing_backups
                    .iter()
                    .map(|volume| format!("volume {} is not backed up in snapshot {}", volume, source))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Decision::fail(obs, REASON_VOLUME_NOT_BACKED_UP, message);
            }
            create_restore(plan)
        }
    }
}

fn decide_snapshotting(plan: &ClonePlan, obs: &Observation) -> Decision {
    if !plan.source.is_virtual_machine() {
        // Snapshot sources skip this phase
        return decide_pending(plan, obs);
    }
    if obs.restore.is_some() {
        return Decision::advance(
            plan,
            ClonePhase::RestoreInProgress,
            Vec::new(),
            REASON_RESTORE_IN_PROGRESS,
            format!("restore {} already exists", plan.restore_name),
        );
    }

    let snapshot_name = plan.restore_snapshot_name();
    match &obs.snapshot {
        None if !obs.source_exists => Decision::wait(
            plan,
            obs,
            REASON_SOURCE_NOT_FOUND,
            format!("snapshot {} and its source virtual machine {} are gone", snapshot_name, plan.source.name()),
        ),
        None => Decision::advance(
            plan,
            ClonePhase::SnapshotInProgress,
            vec![SideEffect::CreateSnapshot],
            REASON_SNAPSHOT_IN_PROGRESS,
            format!("re-creating missing snapshot {}", snapshot_name),
        ),
        Some(snapshot) if snapshot.ready && snapshot.content_name.is_some() => {
            if obs.target_exists {
                return target_exists(plan, obs);
            }
            create_restore(plan)
        }
        Some(_) => Decision::wait(
            plan,
            obs,
            REASON_SNAPSHOT_NOT_READY,
            format!("waiting for snapshot {} to become ready", snapshot_name),
        ),
    }
}

fn decide_restoring(plan: &ClonePlan, obs: &Observation) -> Decision {
    match &obs.restore {
        Some(restore) if restore.complete => {
            if obs.target_exists {
                Decision::complete(plan)
            } else {
                Decision::wait(
                    plan,
                    obs,
                    REASON_TARGET_NOT_FOUND,
                    format!("restore {} is complete but target {} is not visible yet", plan.restore_name, plan.target_name),
                )
            }
        }
        Some(_) => Decision::wait(
            plan,
            obs,
            REASON_RESTORE_NOT_COMPLETE,
            format!("waiting for restore {} to complete", plan.restore_name),
        ),
        // The restore finished and was removed before status caught up
        None if obs.target_exists => Decision::complete(plan),
        None if snapshot_usable(plan, obs) => Decision::advance(
            plan,
            ClonePhase::RestoreInProgress,
            vec![SideEffect::CreateRestore],
            REASON_RESTORE_IN_PROGRESS,
            format!("re-creating missing restore {}", plan.restore_name),
        ),
        None => Decision::fail(
            obs,
            REASON_SNAPSHOT_DELETED,
            format!(
                "restore {} and snapshot {} are gone before target {} was created",
                plan.restore_name,
                plan.restore_snapshot_name(),
                plan.target_name
            ),
        ),
    }
}

fn snapshot_usable(plan: &ClonePlan, obs: &Observation) -> bool {
    match (&plan.source, &obs.snapshot) {
        (CloneSource::VirtualMachine(_), Some(snapshot)) => snapshot.ready && snapshot.content_name.is_some(),
        (CloneSource::Snapshot(_), Some(_)) => obs.content_exists,
        (_, None) => false,
    }
}

fn create_restore(plan: &ClonePlan) -> Decision {
    Decision::advance(
        plan,
        ClonePhase::RestoreInProgress,
        vec![SideEffect::CreateRestore],
        REASON_RESTORE_IN_PROGRESS,
        format!("restoring snapshot {} into {}", plan.restore_snapshot_name(), plan.target_name),
    )
}

fn target_exists(plan: &ClonePlan, obs: &Observation) -> Decision {
    Decision::fail(
        obs,
        REASON_TARGET_EXISTS,
        format!("target virtual machine {} already exists", plan.target_name),
    )
}
