//! Reconciliation logic for VirtualMachineClone.
//!
//! Every reconcile starts from scratch: the clone's persisted status plus a
//! fresh read of its dependents is turned into an `Observation`, the pure
//! state machine in `crate::phase` picks the next step, and this module
//! carries out the side effects and writes status.
//!
//! Side effects live in submodules:
//! - `snapshot`: owned VirtualMachineSnapshot and storage capability checks
//! - `restore`: owned VirtualMachineRestore
//! - `transform`: the one-time patch that gives the target its own identity
//! - `cleanup`: removal of owned intermediates once the clone is terminal

pub mod cleanup;
pub mod restore;
pub mod snapshot;
pub mod transform;


use crate::backoff::ExponentialBackoff;
use crate::config::Config;
use crate::error::ControllerError;
use crate::filters::KeyFilter;
use crate::health::Metrics;
use crate::phase::{
    decide, is_valid_transition, Decision, Observation, Progress, RestoreView, SideEffect,
    SnapshotView, REASON_INVALID_SPEC, REASON_RECONCILE_ERROR, REASON_TRANSFORM_FAILED,
};
use crate::plan::{ClonePlan, CloneSource};
use crate::reconcile_helpers::{
    create_clone_status_patch, desired_status, resource_key, status_needs_update,
};
use crds::{ClonePhase, VirtualMachineClone, CONDITION_READY};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use virt_client::VirtClientTrait;

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: ExponentialBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            backoff: ExponentialBackoff::new(min_seconds, max_seconds),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Reconciles VirtualMachineClone resources.
pub struct Reconciler {
    pub(crate) client: Box<dyn VirtClientTrait + Send + Sync>,
    /// Label/annotation keys owned by other controllers
    pub(crate) ignored_keys: KeyFilter,
    pub(crate) metrics: Arc<Metrics>,
    resync: Duration,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl VirtClientTrait + Send + Sync + 'static,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client: Box::new(client),
            ignored_keys: KeyFilter::new(&config.ignored_metadata_keys),
            metrics,
            resync: config.resync,
            backoff_min_secs: config.backoff_min_secs,
            backoff_max_secs: config.backoff_max_secs,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn reconcile_clone(&self, clone: &VirtualMachineClone) -> Result<Action, ControllerError> {
        let key = resource_key(clone);
        let status = clone.status.as_ref();
        let phase = clone.phase();
        let has_intermediates = status.is_some_and(|s| s.snapshot_name.is_some() || s.restore_name.is_some());

        match phase {
            ClonePhase::Failed if has_intermediates => return self.cleanup_failed(clone).await,
            ClonePhase::Failed => {
                debug!("VirtualMachineClone {} already failed, skipping", key);
                self.clear_backoff(&key);
                return Ok(Action::await_change());
            }
            ClonePhase::Succeeded if !has_intermediates => {
                debug!("VirtualMachineClone {} already succeeded, nothing left to clean up", key);
                self.clear_backoff(&key);
                return Ok(Action::await_change());
            }
            _ => {}
        }

        info!("Reconciling VirtualMachineClone {} (phase {})", key, phase);

        let plan = match ClonePlan::from_clone(clone) {
            Ok(plan) => plan,
            Err(ControllerError::InvalidSpec(message)) => {
                warn!("VirtualMachineClone {} is invalid: {}", key, message);
                self.write_invalid_spec(clone, message).await?;
                self.clear_backoff(&key);
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e),
        };

        match self.reconcile_plan(&plan, clone).await {
            Err(e) if e.is_retryable() && !phase.is_terminal() => {
                self.write_error_condition(clone, &plan, &e).await;
                Err(e)
            }
            result => result,
        }
    }

    async fn reconcile_plan(&self, plan: &ClonePlan, clone: &VirtualMachineClone) -> Result<Action, ControllerError> {
        let key = plan.key();
        let observation = self.observe(plan, clone).await?;
        let mut decision = decide(plan, &observation);
        if !is_valid_transition(observation.phase, decision.phase) {
            return Err(ControllerError::Reconciliation(format!(
                "refusing phase transition {} -> {} for VirtualMachineClone {}",
                observation.phase, decision.phase, key
            )));
        }

        for effect in decision.effects.clone() {
            match effect {
                SideEffect::CreateSnapshot => self.create_snapshot(plan).await?,
                SideEffect::CreateRestore => self.create_restore(plan).await?,
                SideEffect::TransformTarget => match self.transform_target(plan, clone).await {
                    Ok(()) => {}
                    Err(ControllerError::Transform(message)) => {
                        error!("Failed to transform target of VirtualMachineClone {}: {}", key, message);
                        decision = Decision::fail(&observation, REASON_TRANSFORM_FAILED, message);
                        break;
                    }
                    Err(e) => return Err(e),
                },
                SideEffect::Cleanup => {
                    let outcome = self
                        .cleanup(
                            plan,
                            decision.snapshot_name.as_deref(),
                            decision.restore_name.as_deref(),
                        )
                        .await;
                    decision.snapshot_name = outcome.snapshot_name;
                    decision.restore_name = outcome.restore_name;
                }
            }
        }

        // A failed clone keeps its target but not the intermediates
        if decision.phase == ClonePhase::Failed {
            let outcome = self
                .cleanup(
                    plan,
                    decision.snapshot_name.as_deref(),
                    decision.restore_name.as_deref(),
                )
                .await;
            decision.snapshot_name = outcome.snapshot_name;
            decision.restore_name = outcome.restore_name;
        }

        self.write_status(clone, plan, &decision).await?;
        Ok(self.next_action(&key, &decision))
    }

    /// Retries cleanup for a clone that failed while deletes were refused.
    /// Conditions are left as they are.
    async fn cleanup_failed(&self, clone: &VirtualMachineClone) -> Result<Action, ControllerError> {
        let key = resource_key(clone);
        let plan = match ClonePlan::from_clone(clone) {
            Ok(plan) => plan,
            Err(e) => {
                debug!("VirtualMachineClone {} failed and cannot be planned ({}), skipping cleanup", key, e);
                return Ok(Action::await_change());
            }
        };

        let status = clone.status.as_ref();
        let ready = status.and_then(|s| s.conditions.iter().find(|c| c.type_ == CONDITION_READY));
        let observation = Observation {
            phase: ClonePhase::Failed,
            recorded_snapshot: status.and_then(|s| s.snapshot_name.clone()),
            recorded_restore: status.and_then(|s| s.restore_name.clone()),
            ..Default::default()
        };
        let decision = Decision::fail(
            &observation,
            ready.map(|c| c.reason.as_str()).unwrap_or(REASON_TRANSFORM_FAILED),
            ready.map(|c| c.message.clone()).unwrap_or_default(),
        );

        info!("Cleaning up intermediates of failed VirtualMachineClone {}", key);
        let outcome = self
            .cleanup(
                &plan,
                decision.snapshot_name.as_deref(),
                decision.restore_name.as_deref(),
            )
            .await;
        let decision = Decision {
            snapshot_name: outcome.snapshot_name,
            restore_name: outcome.restore_name,
            ..decision
        };

        self.write_status(clone, &plan, &decision).await?;
        Ok(self.next_action(&key, &decision))
    }

    /// Reads the clone's dependents
    async fn observe(&self, plan: &ClonePlan, clone: &VirtualMachineClone) -> Result<Observation, ControllerError> {
        let ns = plan.namespace.as_str();
        let status = clone.status.as_ref();

        let restore = self.client.get_restore(ns, &plan.restore_name).await?;
        let snapshot = self.client.get_snapshot(ns, plan.restore_snapshot_name()).await?;
        let target_exists = self.client.get_vm(ns, &plan.target_name).await?.is_some();

        let mut observation = Observation {
            phase: clone.phase(),
            target_exists,
            snapshot: snapshot.as_ref().map(|s| SnapshotView {
                ready: s.is_ready(),
                content_name: s.content_name().map(str::to_string),
            }),
            restore: restore.as_ref().map(|r| RestoreView {
                complete: r.is_complete(),
            }),
            recorded_snapshot: status.and_then(|s| s.snapshot_name.clone()),
            recorded_restore: status.and_then(|s| s.restore_name.clone()),
            ..Default::default()
        };

        match &plan.source {
            CloneSource::VirtualMachine(source) => {
                let Some(vm) = self.client.get_vm(ns, source).await? else {
                    return Ok(observation);
                };
                observation.source_exists = true;
                // Storage is only checked before the first snapshot is taken
                let first_attempt = observation.phase == ClonePhase::Pending
                    && observation.snapshot.is_none()
                    && observation.restore.is_none()
                    && !observation.target_exists;
                if first_attempt {
                    observation.unsupported_volumes = self.unsupported_volumes(ns, &vm).await?;
                }
            }
            CloneSource::Snapshot(_) => {
                observation.source_exists = snapshot.is_some();
                if let Some(content_name) = snapshot.as_ref().and_then(|s| s.content_name()) {
                    if let Some(content) = self.client.get_snapshot_content(ns, content_name).await? {
                        observation.content_exists = true;
                        observation.missing_backups = content.volumes_missing_backup();
                    }
                }
            }
        }

        Ok(observation)
    }

    async fn write_status(
        &self,
        clone: &VirtualMachineClone,
        plan: &ClonePlan,
        decision: &Decision,
    ) -> Result<(), ControllerError> {
        let current = clone.status.as_ref();
        let desired = desired_status(
            current,
            decision.phase,
            decision.snapshot_name.clone(),
            decision.restore_name.clone(),
            Some(plan.target_name.clone()),
            &decision.progress,
        );
        if !status_needs_update(current, &desired) {
            debug!("VirtualMachineClone {} status unchanged", plan.key());
            return Ok(());
        }

        let patch = create_clone_status_patch(&desired);
        if let Err(e) = self
            .client
            .patch_clone_status(&plan.namespace, &plan.name, &patch)
            .await
        {
            error!("Failed to update VirtualMachineClone {} status: {}", plan.key(), e);
            return Err(e.into());
        }

        let previous = clone.phase();
        if previous != decision.phase {
            info!(
                "VirtualMachineClone {} moved from {} to {} ({})",
                plan.key(),
                previous,
                decision.phase,
                decision.progress.reason()
            );
            self.metrics.record_transition(decision.phase.as_str());
        }
        Ok(())
    }

    /// Records a request that can never succeed as it is written
    async fn write_invalid_spec(&self, clone: &VirtualMachineClone, message: String) -> Result<(), ControllerError> {
        let namespace = clone.namespace().unwrap_or_default();
        let name = clone.name_any();
        let current = clone.status.as_ref();
        let desired = desired_status(
            current,
            ClonePhase::Failed,
            current.and_then(|s| s.snapshot_name.clone()),
            current.and_then(|s| s.restore_name.clone()),
            current.and_then(|s| s.target_name.clone()),
            &Progress::Failed {
                reason: REASON_INVALID_SPEC.to_string(),
                message,
            },
        );
        if !status_needs_update(current, &desired) {
            return Ok(());
        }
        self.client
            .patch_clone_status(&namespace, &name, &create_clone_status_patch(&desired))
            .await?;
        self.metrics.record_transition(ClonePhase::Failed.as_str());
        Ok(())
    }

    /// Surfaces a retryable error on the clone's conditions. Phase and
    /// recorded names are kept. A failed write only gets logged since the
    /// error is returned to the runtime either way.
    async fn write_error_condition(&self, clone: &VirtualMachineClone, plan: &ClonePlan, err: &ControllerError) {
        let current = clone.status.as_ref();
        let desired = desired_status(
            current,
            clone.phase(),
            current.and_then(|s| s.snapshot_name.clone()),
            current.and_then(|s| s.restore_name.clone()),
            Some(plan.target_name.clone()),
            &Progress::Waiting {
                reason: REASON_RECONCILE_ERROR.to_string(),
                message: err.to_string(),
            },
        );
        if !status_needs_update(current, &desired) {
            return;
        }
        if let Err(e) = self
            .client
            .patch_clone_status(&plan.namespace, &plan.name, &create_clone_status_patch(&desired))
            .await
        {
            warn!("Failed to record error on VirtualMachineClone {}: {}", plan.key(), e);
        }
    }

    fn next_action(&self, key: &str, decision: &Decision) -> Action {
        let intermediates_left = decision.snapshot_name.is_some() || decision.restore_name.is_some();
        if decision.phase.is_terminal() && intermediates_left {
            // Only cleanup is left; retry it on the backoff schedule
            let (backoff_seconds, _) = self.get_backoff_for_resource(key);
            debug!(
                "VirtualMachineClone {} is {} with intermediates left, requeue in {}s",
                key, decision.phase, backoff_seconds
            );
            return Action::requeue(Duration::from_secs(backoff_seconds));
        }

        match &decision.progress {
            Progress::Failed { reason, message } => {
                warn!("VirtualMachineClone {} failed ({}): {}", key, reason, message);
                self.clear_backoff(key);
                Action::await_change()
            }
            Progress::Completed => {
                info!("VirtualMachineClone {} succeeded", key);
                self.clear_backoff(key);
                Action::await_change()
            }
            Progress::Waiting { reason, message } => {
                let (backoff_seconds, _) = self.get_backoff_for_resource(key);
                debug!(
                    "VirtualMachineClone {} waiting ({}): {}, requeue in {}s",
                    key, reason, message, backoff_seconds
                );
                Action::requeue(Duration::from_secs(backoff_seconds))
            }
            Progress::Advancing { .. } => {
                self.clear_backoff(key);
                Action::requeue(self.resync)
            }
        }
    }

    /// Decides how to retry after a failed reconcile
    pub fn error_policy(&self, clone: &VirtualMachineClone, error: &ControllerError) -> Action {
        let key = resource_key(clone);
        if error.is_retryable() {
            self.increment_error(&key);
            let (backoff_seconds, error_count) = self.get_backoff_for_resource(&key);
            warn!(
                "Reconciliation of VirtualMachineClone {} failed (attempt {}): {}, retrying in {}s",
                key, error_count, error, backoff_seconds
            );
            Action::requeue(Duration::from_secs(backoff_seconds))
        } else {
            error!("Reconciliation of VirtualMachineClone {} failed permanently: {}", key, error);
            Action::await_change()
        }
    }

    /// Get the exponential backoff duration for a resource
    ///
    /// Returns (backoff_seconds, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs));
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
                (self.backoff_min_secs.max(1), 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs))
                .increment_error();
        }
    }

    /// Forget the backoff of a resource once it made progress or finished
    pub fn clear_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
