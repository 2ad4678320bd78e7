//! Patch-op executor
//!
//! Runs one change's ordered patch ops as an all-or-nothing batch:
//!
//! 1. **Load** every referenced record type once, normalize its schema and
//!    resolve the fields protected by its immediate baseType.
//! 2. **Transform** in memory, keeping the schema that preceded each op.
//! 3. **Validate** the projected tenant graph.
//! 4. **Persist** the changed schemas (after a first-touch snapshot), then
//!    stamp every op.
//!
//! Nothing is written before step 4 starts. Failures in steps 1-3 come back
//! as an [`ExecutionOutcome`] with `success: false`; guard violations before
//! step 1 are returned as [`StrataError`]. A write failure in step 4 undoes
//! the schemas and stamps already written, so the batch can be retried.

use crate::merge_validator::MergeGraphValidator;
use crate::transform::{self, ProtectedFields};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strata_core::{
    ChangeId, ChangePatchOp, ChangeRecord, ChangeStatus, ChangeTarget, DomainEvent, EventBus,
    EventType, PatchOpId, RecordType, RecordTypeSchema, RequestContext, StrataError,
    StrataResult, TargetId, TenantRepository,
};
use strata_graph::{GraphDiffResult, GraphValidationError};

/// Result of executing a change's batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Always 0 on failure
    pub applied_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<GraphValidationError>,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn succeeded(applied_count: usize) -> Self {
        Self {
            success: true,
            applied_count,
            error: None,
            validation_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            applied_count: 0,
            error: Some(error.into()),
            validation_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn rejected(
        error: impl Into<String>,
        validation_errors: Vec<GraphValidationError>,
    ) -> Self {
        Self {
            validation_errors,
            ..Self::failed(error)
        }
    }
}

/// A patch op resolved to the record type it mutates
#[derive(Debug, Clone)]
struct PlannedOp {
    op: ChangePatchOp,
    record_type_key: String,
}

/// A record type as loaded for one batch
#[derive(Debug, Clone)]
struct LoadedRecordType {
    record_type: RecordType,
    schema: RecordTypeSchema,
    protected: ProtectedFields,
}

/// Loaded and transformed, not yet validated or written
#[derive(Debug, Clone)]
struct StagedBatch {
    loaded: BTreeMap<String, LoadedRecordType>,
    working: BTreeMap<String, RecordTypeSchema>,
    applied: Vec<AppliedOp>,
}

/// Applied op with the schema immediately before it
#[derive(Debug, Clone)]
struct AppliedOp {
    op_id: PatchOpId,
    previous: RecordTypeSchema,
}

/// Executes patch-op batches against persisted record types
pub struct PatchOpExecutor {
    repo: Arc<dyn TenantRepository>,
    events: Arc<EventBus>,
    merge_validator: MergeGraphValidator,
}

impl PatchOpExecutor {
    #[must_use]
    pub fn new(repo: Arc<dyn TenantRepository>, events: Arc<EventBus>) -> Self {
        Self {
            merge_validator: MergeGraphValidator::new(repo.clone()),
            repo,
            events,
        }
    }

    /// Execute every patch op of a `ready` change
    ///
    /// # Errors
    /// - [`StrataError::NotFound`] for a missing change or target
    /// - [`StrataError::InvalidState`] when the change is not `ready` or an
    ///   op has already been executed
    /// - [`StrataError::Configuration`] when an op's target is not a record
    ///   type target or names no record type
    /// - [`StrataError::Repository`] on storage failures
    pub async fn execute_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<ExecutionOutcome> {
        let change = self.change(ctx, change_id).await?;
        if !change.status.permits_execution() {
            return Err(StrataError::invalid_state(format!(
                "change {change_id} is {}; execution requires {}",
                change.status,
                ChangeStatus::Ready
            )));
        }

        let ops = self.pending_ops(ctx, change_id).await?;
        if ops.is_empty() {
            tracing::debug!(tenant = %ctx.tenant_id, change_id = %change_id, "no patch ops to execute");
            return Ok(ExecutionOutcome::succeeded(0));
        }

        // Load + Transform
        let batch = match self.stage(ctx, ops).await? {
            Ok(batch) => batch,
            Err(message) => {
                tracing::warn!(tenant = %ctx.tenant_id, change_id = %change_id, %message, "patch op batch rejected");
                return Ok(ExecutionOutcome::failed(message));
            }
        };

        // Validate
        let validation = self.merge_validator.validate(ctx, &batch.working).await?;
        if !validation.is_valid() {
            let message = format!(
                "projected graph failed validation with {} error(s)",
                validation.errors.len()
            );
            let affected = validation
                .errors
                .iter()
                .filter_map(|e| e.node_key.clone())
                .collect();
            let event = DomainEvent::failure(
                EventType::ValidationFailed,
                ctx.tenant_id,
                change_id,
                &message,
            );
            self.events.publish(event.with_affected_records(affected));
            tracing::warn!(tenant = %ctx.tenant_id, change_id = %change_id, errors = validation.errors.len(), "merge validation failed");
            return Ok(ExecutionOutcome::rejected(message, validation.errors));
        }
        let affected = validation.diff.affected_record_keys();
        self.events.publish(
            DomainEvent::success(EventType::ValidationSucceeded, ctx.tenant_id, change_id)
                .with_affected_records(affected.clone()),
        );
        self.events.publish(
            DomainEvent::success(EventType::DiffComputed, ctx.tenant_id, change_id)
                .with_affected_records(affected),
        );

        // Persist
        let persisted = self
            .persist_schemas(ctx, change_id, &batch.loaded, &batch.working)
            .await;
        let written = match persisted {
            Ok(written) => written,
            Err(message) => return Ok(ExecutionOutcome::failed(message)),
        };
        if let Err(message) = self.stamp_ops(ctx, change_id, &batch.applied, &written).await {
            return Ok(ExecutionOutcome::failed(message));
        }

        tracing::info!(
            tenant = %ctx.tenant_id,
            change_id = %change_id,
            applied = batch.applied.len(),
            actor = ctx.actor_label(),
            "patch op batch executed"
        );
        Ok(ExecutionOutcome::succeeded(batch.applied.len()))
    }

    /// Dry run of a change's pending batch: the diff a merge would apply
    ///
    /// Nothing is written and no events are published. Works in any status.
    ///
    /// # Errors
    /// - [`StrataError::ValidationFailure`] when the projected graph breaks
    ///   an invariant
    /// - [`StrataError::BadRequest`] when an op cannot be applied
    /// - otherwise as [`Self::execute_change`]
    pub async fn preview_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<GraphDiffResult> {
        self.change(ctx, change_id).await?;
        let ops = self.pending_ops(ctx, change_id).await?;
        let batch = self.stage(ctx, ops).await?.map_err(StrataError::BadRequest)?;

        let validation = self.merge_validator.validate(ctx, &batch.working).await?;
        if !validation.is_valid() {
            return Err(StrataError::ValidationFailure(validation.errors));
        }
        Ok(validation.diff)
    }

    /// Undo a batch whose ops were stamped but whose merge was not recorded
    ///
    /// Restores every first-touch snapshot of the change and clears the
    /// execution stamps so the batch can run again.
    pub(crate) async fn abandon_batch(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<()> {
        let restored = self.restore_snapshots(ctx, change_id).await?;
        let ops = self.repo.get_change_patch_ops_by_change(ctx, change_id).await?;
        for op in ops.iter().filter(|op| op.is_executed()) {
            self.repo.clear_change_patch_op_execution(ctx, op.id).await?;
        }
        tracing::warn!(tenant = %ctx.tenant_id, change_id = %change_id, restored = restored.len(), "patch op batch abandoned");
        Ok(())
    }

    /// Restore every record type a merged change touched to its first-touch
    /// snapshot; returns the restored keys
    ///
    /// # Errors
    /// [`StrataError::InvalidState`] unless the change is merged,
    /// [`StrataError::NotFound`] for a missing change or record type.
    pub async fn rollback_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<String>> {
        let change = self.change(ctx, change_id).await?;
        if change.status != ChangeStatus::Merged {
            return Err(StrataError::invalid_state(format!(
                "change {change_id} is {}; only merged changes can be rolled back",
                change.status
            )));
        }

        let restored = self.restore_snapshots(ctx, change_id).await?;
        tracing::info!(tenant = %ctx.tenant_id, change_id = %change_id, restored = restored.len(), "change rolled back");
        Ok(restored)
    }

    /// Put back the schema that preceded a single executed op
    ///
    /// # Errors
    /// [`StrataError::InvalidState`] when the op has not run or its change
    /// is not merged; [`StrataError::NotFound`] for missing rows.
    pub async fn revert_patch_op(
        &self,
        ctx: &RequestContext,
        op_id: PatchOpId,
    ) -> StrataResult<RecordType> {
        let op = self
            .repo
            .get_change_patch_op(ctx, op_id)
            .await?
            .ok_or_else(|| StrataError::not_found("patch op", op_id))?;
        let previous = match (&op.executed_at, &op.previous_snapshot) {
            (Some(_), Some(previous)) => previous.clone(),
            _ => {
                return Err(StrataError::invalid_state(format!(
                    "patch op {op_id} has not been executed"
                )))
            }
        };

        let change = self.change(ctx, op.change_id).await?;
        if change.status != ChangeStatus::Merged {
            return Err(StrataError::invalid_state(format!(
                "change {} is {}; only ops of merged changes can be reverted",
                change.id, change.status
            )));
        }

        let target = self.target(ctx, op.target_id).await?;
        let key = record_type_key(&target, &op)?;
        let record_type = self
            .repo
            .get_record_type_by_key(ctx, key)
            .await?
            .ok_or_else(|| StrataError::not_found("record type", key))?;
        let reverted = self
            .repo
            .update_record_type_schema(ctx, record_type.id, previous.to_value())
            .await?;

        tracing::info!(tenant = %ctx.tenant_id, op_id = %op_id, record_type = key, "patch op reverted");
        Ok(reverted)
    }

    async fn change(&self, ctx: &RequestContext, id: ChangeId) -> StrataResult<ChangeRecord> {
        self.repo
            .get_change(ctx, id)
            .await?
            .ok_or_else(|| StrataError::not_found("change", id))
    }

    /// Ops of the change, refusing a batch that already ran
    async fn pending_ops(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<ChangePatchOp>> {
        let ops = self.repo.get_change_patch_ops_by_change(ctx, change_id).await?;
        if let Some(done) = ops.iter().find(|op| op.is_executed()) {
            return Err(StrataError::invalid_state(format!(
                "patch op {} of change {change_id} was already executed",
                done.id
            )));
        }
        Ok(ops)
    }

    /// Write each first-touch snapshot of the change back; returns the keys
    async fn restore_snapshots(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<String>> {
        let snapshots = self.repo.list_snapshots_by_change(ctx, change_id).await?;
        let mut restored = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let record_type = self
                .repo
                .get_record_type_by_key(ctx, &snapshot.record_type_key)
                .await?
                .ok_or_else(|| StrataError::not_found("record type", &snapshot.record_type_key))?;
            self.repo
                .update_record_type_schema(ctx, record_type.id, snapshot.schema.to_value())
                .await?;
            restored.push(snapshot.record_type_key);
        }
        Ok(restored)
    }

    /// Plan, Load and Transform; inner `Err` is an execution-time failure
    async fn stage(
        &self,
        ctx: &RequestContext,
        ops: Vec<ChangePatchOp>,
    ) -> StrataResult<Result<StagedBatch, String>> {
        let planned = self.plan(ctx, ops).await?;
        let loaded = match self.load(ctx, &planned).await? {
            Ok(loaded) => loaded,
            Err(message) => return Ok(Err(message)),
        };
        Ok(transform_batch(&planned, &loaded).map(|(working, applied)| StagedBatch {
            loaded,
            working,
            applied,
        }))
    }

    async fn target(&self, ctx: &RequestContext, id: TargetId) -> StrataResult<ChangeTarget> {
        self.repo
            .get_change_target(ctx, id)
            .await?
            .ok_or_else(|| StrataError::not_found("change target", id))
    }

    /// Resolve each op's target to a record type key
    async fn plan(
        &self,
        ctx: &RequestContext,
        ops: Vec<ChangePatchOp>,
    ) -> StrataResult<Vec<PlannedOp>> {
        let mut targets: HashMap<TargetId, ChangeTarget> = HashMap::new();
        let mut planned = Vec::with_capacity(ops.len());
        for op in ops {
            if !targets.contains_key(&op.target_id) {
                let target = self.target(ctx, op.target_id).await?;
                targets.insert(op.target_id, target);
            }
            let target = &targets[&op.target_id];
            let record_type_key = record_type_key(target, &op)?.to_string();
            planned.push(PlannedOp { op, record_type_key });
        }
        Ok(planned)
    }

    /// Inner `Err` is an execution-time failure message
    async fn load(
        &self,
        ctx: &RequestContext,
        planned: &[PlannedOp],
    ) -> StrataResult<Result<BTreeMap<String, LoadedRecordType>, String>> {
        let mut loaded: BTreeMap<String, LoadedRecordType> = BTreeMap::new();
        for item in planned {
            let key = &item.record_type_key;
            if loaded.contains_key(key) {
                continue;
            }
            let Some(record_type) = self.repo.get_record_type_by_key(ctx, key).await? else {
                return Ok(Err(format!(
                    "patch op {} ({}): record type `{key}` not found",
                    item.op.id,
                    item.op.operation.op_type()
                )));
            };
            let schema = match record_type.normalized_schema() {
                Ok(schema) => schema,
                Err(err) => {
                    return Ok(Err(format!("record type `{key}` has an invalid schema: {err}")));
                }
            };
            let protected = match self.protected_fields(ctx, &record_type).await? {
                Ok(protected) => protected,
                Err(message) => return Ok(Err(message)),
            };
            loaded.insert(
                key.clone(),
                LoadedRecordType {
                    record_type,
                    schema,
                    protected,
                },
            );
        }
        Ok(Ok(loaded))
    }

    /// Required fields of the immediate baseType
    async fn protected_fields(
        &self,
        ctx: &RequestContext,
        record_type: &RecordType,
    ) -> StrataResult<Result<ProtectedFields, String>> {
        let Some(base_key) = record_type.base_type.as_deref() else {
            return Ok(Ok(ProtectedFields::none(&record_type.key)));
        };
        // An unresolved baseType protects nothing; merge validation reports it
        let Some(base) = self.repo.get_record_type_by_key(ctx, base_key).await? else {
            return Ok(Ok(ProtectedFields::none(&record_type.key)));
        };
        Ok(match base.normalized_schema() {
            Ok(schema) => Ok(ProtectedFields::from_base(
                &record_type.key,
                base_key,
                schema.required_field_names(),
            )),
            Err(err) => Err(format!("base type `{base_key}` has an invalid schema: {err}")),
        })
    }

    /// Snapshot then write every changed schema; undo written ones on failure
    async fn persist_schemas<'a>(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        loaded: &'a BTreeMap<String, LoadedRecordType>,
        working: &BTreeMap<String, RecordTypeSchema>,
    ) -> Result<Vec<&'a LoadedRecordType>, String> {
        let mut written: Vec<&LoadedRecordType> = Vec::new();
        for (key, entry) in loaded {
            let Some(next) = working.get(key) else { continue };
            if *next == entry.schema {
                continue;
            }
            let mut result = self
                .repo
                .create_record_type_snapshot(ctx, change_id, key, entry.schema.clone())
                .await
                .map(|_| ());
            if result.is_ok() {
                result = self
                    .repo
                    .update_record_type_schema(ctx, entry.record_type.id, next.to_value())
                    .await
                    .map(|_| ());
            }

            if let Err(err) = result {
                tracing::error!(tenant = %ctx.tenant_id, change_id = %change_id, record_type = %key, error = %err, "persist failed, restoring written schemas");
                self.restore_schemas(ctx, &written).await;
                return Err(format!("failed to persist record type `{key}`: {err}"));
            }
            written.push(entry);
        }
        Ok(written)
    }

    /// Stamp every applied op; on failure unstamp and restore `written`
    async fn stamp_ops(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        applied: &[AppliedOp],
        written: &[&LoadedRecordType],
    ) -> Result<(), String> {
        let executed_at = Utc::now();
        for (index, applied_op) in applied.iter().enumerate() {
            let stamped = self
                .repo
                .update_change_patch_op_snapshot(
                    ctx,
                    applied_op.op_id,
                    applied_op.previous.clone(),
                    executed_at,
                )
                .await;
            if let Err(err) = stamped {
                tracing::error!(tenant = %ctx.tenant_id, change_id = %change_id, op_id = %applied_op.op_id, error = %err, "stamping failed, undoing batch");
                for done in &applied[..index] {
                    let cleared = self.repo.clear_change_patch_op_execution(ctx, done.op_id).await;
                    if let Err(clear_err) = cleared {
                        tracing::error!(op_id = %done.op_id, error = %clear_err, "failed to clear stamp");
                    }
                }
                self.restore_schemas(ctx, written).await;
                return Err(format!("failed to stamp patch op {}: {err}", applied_op.op_id));
            }
        }
        Ok(())
    }

    /// Best effort; restore failures are logged
    async fn restore_schemas(&self, ctx: &RequestContext, written: &[&LoadedRecordType]) {
        for done in written {
            if let Err(err) = self
                .repo
                .update_record_type_schema(ctx, done.record_type.id, done.schema.to_value())
                .await
            {
                tracing::error!(record_type = %done.record_type.key, error = %err, "failed to restore schema");
            }
        }
    }
}

fn record_type_key<'a>(target: &'a ChangeTarget, op: &ChangePatchOp) -> StrataResult<&'a str> {
    let required = op.operation.required_target_type();
    if target.target_type != required {
        return Err(StrataError::Configuration(format!(
            "patch op {} ({}) requires a {required} target, but target {} is {}",
            op.id,
            op.operation.op_type(),
            target.id,
            target.target_type
        )));
    }
    target.record_type_key().ok_or_else(|| {
        StrataError::Configuration(format!(
            "target {} has no record type key in its selector",
            target.id
        ))
    })
}

/// Replay the batch in memory
fn transform_batch(
    planned: &[PlannedOp],
    loaded: &BTreeMap<String, LoadedRecordType>,
) -> Result<(BTreeMap<String, RecordTypeSchema>, Vec<AppliedOp>), String> {
    let mut working: BTreeMap<String, RecordTypeSchema> = loaded
        .iter()
        .map(|(key, entry)| (key.clone(), entry.schema.clone()))
        .collect();
    let mut applied = Vec::with_capacity(planned.len());

    for item in planned {
        let key = &item.record_type_key;
        let (Some(entry), Some(current)) = (loaded.get(key), working.get(key)) else {
            return Err(format!("patch op {}: record type `{key}` not loaded", item.op.id));
        };
        let next = transform::apply(current, &item.op.operation, &entry.protected).map_err(|err| {
            format!("patch op {} ({}) failed: {err}", item.op.id, item.op.operation.op_type())
        })?;
        applied.push(AppliedOp {
            op_id: item.op.id,
            previous: current.clone(),
        });
        working.insert(key.clone(), next);
    }

    Ok((working, applied))
}
