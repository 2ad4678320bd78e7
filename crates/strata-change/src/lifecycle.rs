//! Change lifecycle state machine
//!
//! ```text
//! draft ─▶ implementing ─▶ workspace_running ─▶ validating ─▶ ready ─▶ merged
//!            ▲   │  ▲            │                 │  ▲
//!            │   ▼  └────────────┘                 ▼  │
//!          draft   validating ◀──────────── validation_failed
//! ```
//!
//! Entering `merged` is the only trigger for patch-op execution. When the
//! batch fails the change lands in `validation_failed` instead and the
//! caller gets [`StrataError::MergeRejected`].

use crate::executor::{ExecutionOutcome, PatchOpExecutor};
use serde_json::Value;
use std::sync::Arc;
use strata_core::{
    ChangeId, ChangePatchOp, ChangeRecord, ChangeStatus, ChangeTarget, EventBus, PatchOperation,
    ProjectId, RequestContext, StrataError, StrataResult, TargetId, TargetType, TenantRepository,
};

/// Validates a change status transition
///
/// Same-status requests are handled by [`ChangeLifecycle::transition`]
/// and are not accepted here.
///
/// # Errors
/// [`StrataError::InvalidState`] naming `from -> to`.
pub fn validate_transition(from: ChangeStatus, to: ChangeStatus) -> StrataResult<()> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StrataError::invalid_state(format!(
            "illegal change transition {from} -> {to}"
        )))
    }
}

pub fn allowed_transitions(from: ChangeStatus) -> Vec<ChangeStatus> {
    use ChangeStatus::*;
    match from {
        Draft => vec![Implementing],
        Implementing => vec![WorkspaceRunning, Validating, Draft],
        WorkspaceRunning => vec![Validating, Implementing],
        Validating => vec![Ready, ValidationFailed],
        ValidationFailed => vec![Implementing, Validating],
        Ready => vec![Merged],
        Merged => vec![],
    }
}

fn allowed(from: ChangeStatus, to: ChangeStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

/// Change operations gated by the lifecycle
pub struct ChangeLifecycle {
    repo: Arc<dyn TenantRepository>,
    executor: Arc<PatchOpExecutor>,
}

impl ChangeLifecycle {
    #[must_use]
    pub fn new(repo: Arc<dyn TenantRepository>, events: Arc<EventBus>) -> Self {
        let executor = Arc::new(PatchOpExecutor::new(repo.clone(), events));
        Self { repo, executor }
    }

    /// The executor merges run through, for rollback and preview
    #[must_use]
    pub fn executor(&self) -> &Arc<PatchOpExecutor> {
        &self.executor
    }

    /// Create a draft change
    ///
    /// # Errors
    /// [`StrataError::BadRequest`] for a blank title, plus repository errors.
    pub async fn open_change(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        title: &str,
    ) -> StrataResult<ChangeRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StrataError::bad_request("change title must not be empty"));
        }
        let change = self
            .repo
            .create_change(ctx, ChangeRecord::draft(ctx.tenant_id, project_id, title))
            .await?;
        tracing::info!(tenant = %ctx.tenant_id, change_id = %change.id, "change opened");
        Ok(change)
    }

    /// Register something the change intends to modify
    ///
    /// # Errors
    /// [`StrataError::NotFound`] for a missing change,
    /// [`StrataError::InvalidState`] outside draft/validation_failed,
    /// [`StrataError::BadRequest`] for a record type target without key.
    pub async fn add_target(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        target_type: TargetType,
        selector: Value,
    ) -> StrataResult<ChangeTarget> {
        let change = self.editable_change(ctx, change_id, "add targets to").await?;
        let target = ChangeTarget {
            id: TargetId::new(),
            tenant_id: ctx.tenant_id,
            project_id: change.project_id,
            change_id,
            target_type,
            selector,
        };
        if target_type == TargetType::RecordType && target.record_type_key().is_none() {
            return Err(StrataError::bad_request(
                "record_type target selector must name a recordTypeKey",
            ));
        }
        self.repo.create_change_target(ctx, target).await
    }

    /// Shorthand for a `record_type` target on `key`
    ///
    /// # Errors
    /// See [`Self::add_target`].
    pub async fn add_record_type_target(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        key: &str,
    ) -> StrataResult<ChangeTarget> {
        self.add_target(
            ctx,
            change_id,
            TargetType::RecordType,
            ChangeTarget::record_type_selector(key),
        )
        .await
    }

    /// Queue a patch op on one of the change's targets
    ///
    /// # Errors
    /// [`StrataError::NotFound`] for a missing change or target,
    /// [`StrataError::InvalidState`] outside draft/validation_failed,
    /// [`StrataError::BadRequest`] when the target belongs to another change
    /// or its type does not match the operation.
    pub async fn create_patch_op(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        target_id: TargetId,
        operation: PatchOperation,
    ) -> StrataResult<ChangePatchOp> {
        self.editable_change(ctx, change_id, "create patch ops in").await?;
        let target = self
            .repo
            .get_change_target(ctx, target_id)
            .await?
            .ok_or_else(|| StrataError::not_found("change target", target_id))?;
        if target.change_id != change_id {
            return Err(StrataError::bad_request(format!(
                "target {target_id} belongs to change {}",
                target.change_id
            )));
        }
        let required = operation.required_target_type();
        if target.target_type != required {
            return Err(StrataError::bad_request(format!(
                "{} requires a {required} target, got {}",
                operation.op_type(),
                target.target_type
            )));
        }

        let op = self
            .repo
            .create_change_patch_op(ctx, ChangePatchOp::new(&target, operation))
            .await?;
        tracing::debug!(tenant = %ctx.tenant_id, change_id = %change_id, op_id = %op.id, op_type = op.operation.op_type(), "patch op created");
        Ok(op)
    }

    /// Move a change to `to`
    ///
    /// Requesting the current status is a no-op. Entering `merged` executes
    /// the change's batch first.
    ///
    /// # Errors
    /// [`StrataError::InvalidState`] for an illegal transition,
    /// [`StrataError::MergeRejected`] when execution fails (the change is
    /// then `validation_failed`).
    pub async fn transition(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        to: ChangeStatus,
    ) -> StrataResult<ChangeRecord> {
        let change = self
            .repo
            .get_change(ctx, change_id)
            .await?
            .ok_or_else(|| StrataError::not_found("change", change_id))?;
        if change.status == to {
            return Ok(change);
        }
        validate_transition(change.status, to)?;

        if to == ChangeStatus::Merged {
            return self.merge(ctx, change).await;
        }

        let updated = self.repo.update_change_status(ctx, change_id, to).await?;
        tracing::info!(tenant = %ctx.tenant_id, change_id = %change_id, from = %change.status, to = %to, "change transitioned");
        Ok(updated)
    }

    async fn merge(
        &self,
        ctx: &RequestContext,
        change: ChangeRecord,
    ) -> StrataResult<ChangeRecord> {
        let rejection = match self.executor.execute_change(ctx, change.id).await {
            Ok(ExecutionOutcome { success: true, applied_count, .. }) => {
                match self
                    .repo
                    .update_change_status(ctx, change.id, ChangeStatus::Merged)
                    .await
                {
                    Ok(merged) => {
                        tracing::info!(tenant = %ctx.tenant_id, change_id = %change.id, applied = applied_count, "change merged");
                        return Ok(merged);
                    }
                    Err(err) => {
                        tracing::error!(tenant = %ctx.tenant_id, change_id = %change.id, error = %err, "failed to record merge");
                        self.executor.abandon_batch(ctx, change.id).await?;
                        StrataError::MergeRejected {
                            message: format!("failed to record merge: {err}"),
                            errors: Vec::new(),
                        }
                    }
                }
            }
            Ok(outcome) => StrataError::MergeRejected {
                message: outcome
                    .error
                    .unwrap_or_else(|| "patch op execution failed".to_string()),
                errors: outcome.validation_errors,
            },
            Err(err) => StrataError::MergeRejected {
                message: err.to_string(),
                errors: err.validation_errors().to_vec(),
            },
        };

        self.repo
            .update_change_status(ctx, change.id, ChangeStatus::ValidationFailed)
            .await?;
        tracing::warn!(tenant = %ctx.tenant_id, change_id = %change.id, error = %rejection, "merge rejected");
        Err(rejection)
    }

    async fn editable_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        action: &str,
    ) -> StrataResult<ChangeRecord> {
        let change = self
            .repo
            .get_change(ctx, change_id)
            .await?
            .ok_or_else(|| StrataError::not_found("change", change_id))?;
        if !change.status.accepts_patch_ops() {
            return Err(StrataError::invalid_state(format!(
                "cannot {action} change {change_id} while it is {}",
                change.status
            )));
        }
        Ok(change)
    }
}
