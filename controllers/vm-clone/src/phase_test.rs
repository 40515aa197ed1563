//! Unit tests for the clone phase state machine

#[cfg(test)]
mod tests {
    use crate::phase::*;
    use crate::plan::ClonePlan;
    use crds::{ClonePhase, VirtualMachineClone};

    fn plan_from_vm() -> ClonePlan {
        let mut clone = VirtualMachineClone::new_minimal("testclone", "default")
            .from_vm("source-vm")
            .with_target("target-vm");
        clone.metadata.uid = Some("uid-1".to_string());
        ClonePlan::from_clone(&clone).unwrap()
    }

    fn plan_from_snapshot() -> ClonePlan {
        let mut clone = VirtualMachineClone::new_minimal("testclone", "default")
            .from_snapshot("user-snap")
            .with_target("target-vm");
        clone.metadata.uid = Some("uid-1".to_string());
        ClonePlan::from_clone(&clone).unwrap()
    }

    fn observed(phase: ClonePhase) -> Observation {
        Observation {
            phase,
            source_exists: true,
            ..Default::default()
        }
    }

    fn ready_snapshot() -> Option<SnapshotView> {
        Some(SnapshotView {
            ready: true,
            content_name: Some("content".to_string()),
        })
    }

    fn failure(decision: &Decision) -> (&str, &str) {
        match &decision.progress {
            Progress::Failed { reason, message } => (reason.as_str(), message.as_str()),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_vm_source_creates_snapshot() {
        let plan = plan_from_vm();
        let decision = decide(&plan, &observed(ClonePhase::Pending));
        assert_eq!(decision.phase, ClonePhase::SnapshotInProgress);
        assert_eq!(decision.effects, vec![SideEffect::CreateSnapshot]);
        assert_eq!(decision.snapshot_name.as_deref(), Some("tmp-snapshot-uid-1"));
        assert_eq!(decision.restore_name, None);
    }

    #[test]
    fn test_pending_target_exists_fails() {
        let plan = plan_from_vm();
        let obs = Observation {
            target_exists: true,
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::Failed);
        assert_eq!(failure(&decision).0, REASON_TARGET_EXISTS);
        assert!(decision.effects.is_empty());
    }

    #[test]
    fn test_pending_source_missing_waits() {
        let plan = plan_from_vm();
        let obs = Observation {
            source_exists: false,
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::Pending);
        assert!(decision.effects.is_empty());
        assert_eq!(decision.progress.reason(), REASON_SOURCE_NOT_FOUND);
    }

    #[test]
    fn test_pending_unsupported_volume_fails() {
        let plan = plan_from_vm();
        let obs = Observation {
            unsupported_volumes: vec!["rootdisk".to_string()],
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        let (reason, message) = failure(&decision);
        assert_eq!(reason, REASON_SNAPSHOT_UNSUPPORTED);
        assert!(message.contains("does not support snapshots"));
        assert!(message.contains("rootdisk"));
    }

    #[test]
    fn test_pending_with_existing_snapshot_resumes() {
        let plan = plan_from_vm();
        // The target check is skipped: the snapshot proves this request already passed it
        let obs = Observation {
            snapshot: Some(SnapshotView::default()),
            target_exists: true,
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::SnapshotInProgress);
        assert!(decision.effects.is_empty());
    }

    #[test]
    fn test_pending_with_existing_restore_resumes() {
        let plan = plan_from_vm();
        let obs = Observation {
            restore: Some(RestoreView { complete: false }),
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::RestoreInProgress);
        assert!(decision.effects.is_empty());
        assert_eq!(decision.restore_name.as_deref(), Some("tmp-restore-uid-1"));
    }

    #[test]
    fn test_pending_snapshot_source_goes_straight_to_restore() {
        let plan = plan_from_snapshot();
        let obs = Observation {
            snapshot: Some(SnapshotView::default()),
            content_exists: true,
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::RestoreInProgress);
        assert_eq!(decision.effects, vec![SideEffect::CreateRestore]);
        // Borrowed snapshots are never recorded
        assert_eq!(decision.snapshot_name, None);
    }

    #[test]
    fn test_pending_snapshot_source_without_content_waits() {
        let plan = plan_from_snapshot();
        let obs = Observation {
            snapshot: Some(SnapshotView::default()),
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::Pending);
        assert_eq!(decision.progress.reason(), REASON_CONTENT_NOT_FOUND);
    }

    #[test]
    fn test_pending_snapshot_source_missing_backup_fails() {
        let plan = plan_from_snapshot();
        let obs = Observation {
            snapshot: Some(SnapshotView::default()),
            content_exists: true,
            missing_backups: vec!["datadisk".to_string()],
            ..observed(ClonePhase::Pending)
        };
        let decision = decide(&plan, &obs);
        let (reason, message) = failure(&decision);
        assert_eq!(reason, REASON_VOLUME_NOT_BACKED_UP);
        assert!(message.contains("not backed up in snapshot"));
        assert!(message.contains("user-snap"));
    }

    #[test]
    fn test_snapshotting_waits_for_readiness() {
        let plan = plan_from_vm();
        let obs = Observation {
            snapshot: Some(SnapshotView {
                ready: true,
                content_name: None,
            }),
            ..observed(ClonePhase::SnapshotInProgress)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::SnapshotInProgress);
        assert_eq!(decision.progress.reason(), REASON_SNAPSHOT_NOT_READY);
        assert_eq!(decision.snapshot_name.as_deref(), Some("tmp-snapshot-uid-1"));
    }

    #[test]
    fn test_snapshotting_ready_creates_restore() {
        let plan = plan_from_vm();
        let obs = Observation {
            snapshot: ready_snapshot(),
            ..observed(ClonePhase::SnapshotInProgress)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::RestoreInProgress);
        assert_eq!(decision.effects, vec![SideEffect::CreateRestore]);
        assert_eq!(decision.snapshot_name.as_deref(), Some("tmp-snapshot-uid-1"));
        assert_eq!(decision.restore_name.as_deref(), Some("tmp-restore-uid-1"));
    }

    #[test]
    fn test_snapshotting_recreates_missing_snapshot() {
        let plan = plan_from_vm();
        let decision = decide(&plan, &observed(ClonePhase::SnapshotInProgress));
        assert_eq!(decision.phase, ClonePhase::SnapshotInProgress);
        assert_eq!(decision.effects, vec![SideEffect::CreateSnapshot]);
    }

    #[test]
    fn test_restoring_waits_for_completion() {
        let plan = plan_from_vm();
        let obs = Observation {
            restore: Some(RestoreView { complete: false }),
            ..observed(ClonePhase::RestoreInProgress)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::RestoreInProgress);
        assert_eq!(decision.progress.reason(), REASON_RESTORE_NOT_COMPLETE);
        assert!(decision.effects.is_empty());
    }

    #[test]
    fn test_restoring_complete_transforms_and_cleans_up() {
        let plan = plan_from_vm();
        let obs = Observation {
            restore: Some(RestoreView { complete: true }),
            target_exists: true,
            ..observed(ClonePhase::RestoreInProgress)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::Succeeded);
        assert_eq!(decision.effects, vec![SideEffect::TransformTarget, SideEffect::Cleanup]);
        assert_eq!(decision.progress, Progress::Completed);
    }

    #[test]
    fn test_restoring_missing_restore_with_target_finishes() {
        let plan = plan_from_vm();
        let obs = Observation {
            target_exists: true,
            ..observed(ClonePhase::RestoreInProgress)
        };
        assert_eq!(decide(&plan, &obs).phase, ClonePhase::Succeeded);
    }

    #[test]
    fn test_restoring_recreates_restore_from_snapshot() {
        let plan = plan_from_vm();
        let obs = Observation {
            snapshot: ready_snapshot(),
            ..observed(ClonePhase::RestoreInProgress)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.phase, ClonePhase::RestoreInProgress);
        assert_eq!(decision.effects, vec![SideEffect::CreateRestore]);
    }

    #[test]
    fn test_restoring_without_restore_or_snapshot_fails() {
        let plan = plan_from_vm();
        let obs = Observation {
            recorded_snapshot: Some("tmp-snapshot-uid-1".to_string()),
            recorded_restore: Some("tmp-restore-uid-1".to_string()),
            ..observed(ClonePhase::RestoreInProgress)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(failure(&decision).0, REASON_SNAPSHOT_DELETED);
        assert_eq!(decision.restore_name.as_deref(), Some("tmp-restore-uid-1"));
    }

    #[test]
    fn test_succeeded_only_cleans_up_recorded_names() {
        let plan = plan_from_vm();
        let decision = decide(&plan, &observed(ClonePhase::Succeeded));
        assert!(decision.effects.is_empty());

        let obs = Observation {
            recorded_snapshot: Some("tmp-snapshot-uid-1".to_string()),
            ..observed(ClonePhase::Succeeded)
        };
        let decision = decide(&plan, &obs);
        assert_eq!(decision.effects, vec![SideEffect::Cleanup]);
        assert_eq!(decision.restore_name, None);
    }

    #[test]
    fn test_failed_is_inert() {
        let plan = plan_from_vm();
        let decision = decide(&plan, &observed(ClonePhase::Failed));
        assert_eq!(decision.phase, ClonePhase::Failed);
        assert!(decision.effects.is_empty());
    }

    #[test]
    fn test_transition_table() {
        use ClonePhase::*;
        assert!(is_valid_transition(Pending, SnapshotInProgress));
        assert!(is_valid_transition(Pending, RestoreInProgress));
        assert!(is_valid_transition(SnapshotInProgress, RestoreInProgress));
        assert!(is_valid_transition(RestoreInProgress, Succeeded));
        assert!(is_valid_transition(RestoreInProgress, Failed));
        assert!(is_valid_transition(Succeeded, Succeeded));
        assert!(!is_valid_transition(Pending, Succeeded));
        assert!(!is_valid_transition(Succeeded, Failed));
        assert!(!is_valid_transition(Failed, Pending));
        assert!(!is_valid_transition(RestoreInProgress, SnapshotInProgress));
    }
}
