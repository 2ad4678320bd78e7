//! Tenant-scoped repository contracts
//!
//! The storage engine is an external collaborator. Services depend only on
//! these traits; every call carries a [`RequestContext`] and
//! implementations must never return rows belonging to another tenant.
//!
//! Lookups return `Ok(None)` for missing rows; the services decide whether
//! that is a `NotFound` or an execution-time outcome.

use crate::context::RequestContext;
use crate::error::StrataResult;
use crate::ids::{
    ChangeId, EnvironmentId, PatchOpId, ProjectId, PromotionIntentId, RecordTypeId, TargetId,
};
use crate::types::{
    ChangePatchOp, ChangeRecord, ChangeStatus, ChangeTarget, Environment, PackageInstall,
    PromotedPackage, PromotionIntent, RecordType, RecordTypeSchema, RecordTypeSnapshot,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use strata_graph::GraphBindings;

/// Changes, their targets and their patch ops
#[async_trait::async_trait]
pub trait ChangeStore: Send + Sync {
    async fn get_change(
        &self,
        ctx: &RequestContext,
        id: ChangeId,
    ) -> StrataResult<Option<ChangeRecord>>;

    async fn create_change(
        &self,
        ctx: &RequestContext,
        change: ChangeRecord,
    ) -> StrataResult<ChangeRecord>;

    async fn update_change_status(
        &self,
        ctx: &RequestContext,
        id: ChangeId,
        status: ChangeStatus,
    ) -> StrataResult<ChangeRecord>;

    async fn get_change_target(
        &self,
        ctx: &RequestContext,
        id: TargetId,
    ) -> StrataResult<Option<ChangeTarget>>;

    async fn create_change_target(
        &self,
        ctx: &RequestContext,
        target: ChangeTarget,
    ) -> StrataResult<ChangeTarget>;

    /// Patch ops of a change in creation order
    async fn get_change_patch_ops_by_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<ChangePatchOp>>;

    async fn get_change_patch_op(
        &self,
        ctx: &RequestContext,
        id: PatchOpId,
    ) -> StrataResult<Option<ChangePatchOp>>;

    async fn create_change_patch_op(
        &self,
        ctx: &RequestContext,
        op: ChangePatchOp,
    ) -> StrataResult<ChangePatchOp>;

    /// Stamp an op with the schema it was applied to and its execution time
    async fn update_change_patch_op_snapshot(
        &self,
        ctx: &RequestContext,
        id: PatchOpId,
        previous_snapshot: RecordTypeSchema,
        executed_at: DateTime<Utc>,
    ) -> StrataResult<()>;

    /// Drop an op's execution stamp so the op can run again
    async fn clear_change_patch_op_execution(
        &self,
        ctx: &RequestContext,
        id: PatchOpId,
    ) -> StrataResult<()>;
}

/// Persisted record types and the bindings pointing at them
#[async_trait::async_trait]
pub trait RecordTypeStore: Send + Sync {
    async fn get_record_type_by_key(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> StrataResult<Option<RecordType>>;

    /// Every record type of the tenant, ordered by key
    async fn list_record_types(&self, ctx: &RequestContext) -> StrataResult<Vec<RecordType>>;

    async fn update_record_type_schema(
        &self,
        ctx: &RequestContext,
        id: RecordTypeId,
        schema: Value,
    ) -> StrataResult<RecordType>;

    async fn list_bindings(&self, ctx: &RequestContext) -> StrataResult<GraphBindings>;
}

/// First-touch record type snapshots
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_snapshot_by_change_and_key(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        record_type_key: &str,
    ) -> StrataResult<Option<RecordTypeSnapshot>>;

    async fn list_snapshots_by_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<RecordTypeSnapshot>>;

    /// Insert the snapshot for `(change_id, record_type_key)` unless one
    /// exists; either way the stored snapshot is returned
    async fn create_record_type_snapshot(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        record_type_key: &str,
        schema: RecordTypeSchema,
    ) -> StrataResult<RecordTypeSnapshot>;
}

/// Environments and their installed packages
#[async_trait::async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn get_environment(
        &self,
        ctx: &RequestContext,
        id: EnvironmentId,
    ) -> StrataResult<Option<Environment>>;

    /// Installed packages, ordered by package key
    async fn list_environment_package_installs(
        &self,
        ctx: &RequestContext,
        environment_id: EnvironmentId,
    ) -> StrataResult<Vec<PackageInstall>>;

    /// Copy the named source installs into the target environment
    async fn promote_environment_packages(
        &self,
        ctx: &RequestContext,
        from: EnvironmentId,
        to: EnvironmentId,
        package_keys: &[String],
    ) -> StrataResult<Vec<PromotedPackage>>;
}

/// Promotion intents
#[async_trait::async_trait]
pub trait PromotionStore: Send + Sync {
    async fn create_promotion_intent(
        &self,
        ctx: &RequestContext,
        intent: PromotionIntent,
    ) -> StrataResult<PromotionIntent>;

    async fn get_promotion_intent(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
    ) -> StrataResult<Option<PromotionIntent>>;

    async fn update_promotion_intent(
        &self,
        ctx: &RequestContext,
        intent: PromotionIntent,
    ) -> StrataResult<PromotionIntent>;

    /// Intents of a project, newest first
    async fn list_promotion_intents(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> StrataResult<Vec<PromotionIntent>>;
}

/// Everything the services need from storage
pub trait TenantRepository:
    ChangeStore + RecordTypeStore + SnapshotStore + EnvironmentStore + PromotionStore
{
}

impl<T> TenantRepository for T where
    T: ChangeStore + RecordTypeStore + SnapshotStore + EnvironmentStore + PromotionStore
{
}
