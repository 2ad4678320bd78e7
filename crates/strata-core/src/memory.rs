//! In-memory tenant repository
//!
//! Reference implementation of every store trait, used by tests, the CLI
//! and embedders that do not need durable storage. Rows are keyed by
//! tenant so lookups from another tenant never see them.

use crate::context::RequestContext;
use crate::error::{StrataError, StrataResult};
use crate::ids::{
    ChangeId, EnvironmentId, PatchOpId, ProjectId, PromotionIntentId, RecordTypeId, SnapshotId,
    TargetId, TenantId,
};
use crate::repository::{
    ChangeStore, EnvironmentStore, PromotionStore, RecordTypeStore, SnapshotStore,
};
use crate::types::{
    ChangePatchOp, ChangeRecord, ChangeStatus, ChangeTarget, Environment, PackageInstall,
    PromotedPackage, PromotionIntent, RecordType, RecordTypeSchema, RecordTypeSnapshot,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use strata_graph::GraphBindings;

/// Counters of mutating storage calls
#[derive(Debug, Default)]
pub struct WriteStats {
    schema_writes: AtomicUsize,
    snapshot_creates: AtomicUsize,
    op_stamps: AtomicUsize,
}

impl WriteStats {
    #[must_use]
    pub fn schema_writes(&self) -> usize {
        self.schema_writes.load(Ordering::SeqCst)
    }

    /// Snapshots actually inserted (existing ones are not counted)
    #[must_use]
    pub fn snapshot_creates(&self) -> usize {
        self.snapshot_creates.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn op_stamps(&self) -> usize {
        self.op_stamps.load(Ordering::SeqCst)
    }

    /// Sum of all schema-evolution writes
    #[must_use]
    pub fn total(&self) -> usize {
        self.schema_writes() + self.snapshot_creates() + self.op_stamps()
    }
}

/// Writes the repository is told to refuse
#[derive(Debug, Default)]
struct InjectedFailures {
    schema_keys: HashSet<String>,
    op_stamps: HashSet<PatchOpId>,
    statuses: HashSet<ChangeStatus>,
}

#[derive(Debug, Clone)]
struct StoredOp {
    seq: u64,
    op: ChangePatchOp,
}

/// DashMap-backed implementation of [`crate::repository::TenantRepository`]
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    changes: DashMap<(TenantId, ChangeId), ChangeRecord>,
    targets: DashMap<(TenantId, TargetId), ChangeTarget>,
    patch_ops: DashMap<(TenantId, PatchOpId), StoredOp>,
    record_types: DashMap<(TenantId, String), RecordType>,
    bindings: DashMap<TenantId, GraphBindings>,
    snapshots: DashMap<(TenantId, ChangeId, String), RecordTypeSnapshot>,
    environments: DashMap<(TenantId, EnvironmentId), Environment>,
    installs: DashMap<(TenantId, EnvironmentId), BTreeMap<String, PackageInstall>>,
    intents: DashMap<(TenantId, PromotionIntentId), PromotionIntent>,
    next_seq: AtomicU64,
    failures: RwLock<InjectedFailures>,
    stats: WriteStats,
}

impl InMemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }

    /// Make every schema write for `key` fail with a repository error
    pub fn fail_schema_writes_for(&self, key: impl Into<String>) {
        self.failures.write().schema_keys.insert(key.into());
    }

    /// Make stamping `op_id` as executed fail with a repository error
    pub fn fail_op_stamps_for(&self, op_id: PatchOpId) {
        self.failures.write().op_stamps.insert(op_id);
    }

    /// Make every status update to `status` fail with a repository error
    pub fn fail_status_updates_to(&self, status: ChangeStatus) {
        self.failures.write().statuses.insert(status);
    }

    /// Drop every injected failure
    pub fn clear_failures(&self) {
        *self.failures.write() = InjectedFailures::default();
    }

    /// Seed or replace a record type
    pub fn insert_record_type(&self, record_type: RecordType) {
        self.record_types
            .insert((record_type.tenant_id, record_type.key.clone()), record_type);
    }

    /// Replace the tenant's bindings
    pub fn set_bindings(&self, tenant_id: TenantId, bindings: GraphBindings) {
        self.bindings.insert(tenant_id, bindings);
    }

    pub fn insert_environment(&self, environment: Environment) {
        self.environments
            .insert((environment.tenant_id, environment.id), environment);
    }

    /// Seed or replace an installed package
    pub fn install_package(&self, tenant_id: TenantId, install: PackageInstall) {
        self.installs
            .entry((tenant_id, install.environment_id))
            .or_default()
            .insert(install.package_key.clone(), install);
    }

    fn tenant(ctx: &RequestContext) -> TenantId {
        ctx.tenant_id
    }
}

#[async_trait::async_trait]
impl ChangeStore for InMemoryRepository {
    async fn get_change(
        &self,
        ctx: &RequestContext,
        id: ChangeId,
    ) -> StrataResult<Option<ChangeRecord>> {
        Ok(self.changes.get(&(Self::tenant(ctx), id)).map(|c| c.clone()))
    }

    async fn create_change(
        &self,
        ctx: &RequestContext,
        mut change: ChangeRecord,
    ) -> StrataResult<ChangeRecord> {
        change.tenant_id = Self::tenant(ctx);
        self.changes.insert((change.tenant_id, change.id), change.clone());
        Ok(change)
    }

    async fn update_change_status(
        &self,
        ctx: &RequestContext,
        id: ChangeId,
        status: ChangeStatus,
    ) -> StrataResult<ChangeRecord> {
        if self.failures.read().statuses.contains(&status) {
            return Err(StrataError::Repository(format!(
                "status update of change {id} to {status} rejected"
            )));
        }
        let mut entry = self
            .changes
            .get_mut(&(Self::tenant(ctx), id))
            .ok_or_else(|| StrataError::not_found("change", id))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn get_change_target(
        &self,
        ctx: &RequestContext,
        id: TargetId,
    ) -> StrataResult<Option<ChangeTarget>> {
        Ok(self.targets.get(&(Self::tenant(ctx), id)).map(|t| t.clone()))
    }

    async fn create_change_target(
        &self,
        ctx: &RequestContext,
        mut target: ChangeTarget,
    ) -> StrataResult<ChangeTarget> {
        target.tenant_id = Self::tenant(ctx);
        self.targets.insert((target.tenant_id, target.id), target.clone());
        Ok(target)
    }

    async fn get_change_patch_ops_by_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<ChangePatchOp>> {
        let tenant = Self::tenant(ctx);
        let mut ops: Vec<StoredOp> = self
            .patch_ops
            .iter()
            .filter(|e| e.key().0 == tenant && e.op.change_id == change_id)
            .map(|e| e.value().clone())
            .collect();
        ops.sort_by_key(|s| s.seq);
        Ok(ops.into_iter().map(|s| s.op).collect())
    }

    async fn get_change_patch_op(
        &self,
        ctx: &RequestContext,
        id: PatchOpId,
    ) -> StrataResult<Option<ChangePatchOp>> {
        Ok(self
            .patch_ops
            .get(&(Self::tenant(ctx), id))
            .map(|s| s.op.clone()))
    }

    async fn create_change_patch_op(
        &self,
        ctx: &RequestContext,
        mut op: ChangePatchOp,
    ) -> StrataResult<ChangePatchOp> {
        op.tenant_id = Self::tenant(ctx);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.patch_ops
            .insert((op.tenant_id, op.id), StoredOp { seq, op: op.clone() });
        Ok(op)
    }

    async fn update_change_patch_op_snapshot(
        &self,
        ctx: &RequestContext,
        id: PatchOpId,
        previous_snapshot: RecordTypeSchema,
        executed_at: DateTime<Utc>,
    ) -> StrataResult<()> {
        if self.failures.read().op_stamps.contains(&id) {
            return Err(StrataError::Repository(format!("stamp of patch op {id} rejected")));
        }
        let mut entry = self
            .patch_ops
            .get_mut(&(Self::tenant(ctx), id))
            .ok_or_else(|| StrataError::not_found("patch op", id))?;
        entry.op.previous_snapshot = Some(previous_snapshot);
        entry.op.executed_at = Some(executed_at);
        self.stats.op_stamps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_change_patch_op_execution(
        &self,
        ctx: &RequestContext,
        id: PatchOpId,
    ) -> StrataResult<()> {
        let mut entry = self
            .patch_ops
            .get_mut(&(Self::tenant(ctx), id))
            .ok_or_else(|| StrataError::not_found("patch op", id))?;
        entry.op.previous_snapshot = None;
        entry.op.executed_at = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordTypeStore for InMemoryRepository {
    async fn get_record_type_by_key(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> StrataResult<Option<RecordType>> {
        Ok(self
            .record_types
            .get(&(Self::tenant(ctx), key.to_string()))
            .map(|r| r.clone()))
    }

    async fn list_record_types(&self, ctx: &RequestContext) -> StrataResult<Vec<RecordType>> {
        let tenant = Self::tenant(ctx);
        let mut out: Vec<RecordType> = self
            .record_types
            .iter()
            .filter(|e| e.key().0 == tenant)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn update_record_type_schema(
        &self,
        ctx: &RequestContext,
        id: RecordTypeId,
        schema: Value,
    ) -> StrataResult<RecordType> {
        let tenant = Self::tenant(ctx);
        let mut entry = self
            .record_types
            .iter_mut()
            .find(|e| e.key().0 == tenant && e.id == id)
            .ok_or_else(|| StrataError::not_found("record type", id))?;
        if self.failures.read().schema_keys.contains(&entry.key) {
            return Err(StrataError::Repository(format!(
                "schema write rejected for {}",
                entry.key
            )));
        }
        entry.schema = schema;
        entry.updated_at = Utc::now();
        self.stats.schema_writes.fetch_add(1, Ordering::SeqCst);
        Ok(entry.clone())
    }

    async fn list_bindings(&self, ctx: &RequestContext) -> StrataResult<GraphBindings> {
        Ok(self
            .bindings
            .get(&Self::tenant(ctx))
            .map(|b| b.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemoryRepository {
    async fn get_snapshot_by_change_and_key(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        record_type_key: &str,
    ) -> StrataResult<Option<RecordTypeSnapshot>> {
        Ok(self
            .snapshots
            .get(&(Self::tenant(ctx), change_id, record_type_key.to_string()))
            .map(|s| s.clone()))
    }

    async fn list_snapshots_by_change(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
    ) -> StrataResult<Vec<RecordTypeSnapshot>> {
        let tenant = Self::tenant(ctx);
        let mut out: Vec<RecordTypeSnapshot> = self
            .snapshots
            .iter()
            .filter(|e| e.key().0 == tenant && e.key().1 == change_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.record_type_key.cmp(&b.record_type_key));
        Ok(out)
    }

    async fn create_record_type_snapshot(
        &self,
        ctx: &RequestContext,
        change_id: ChangeId,
        record_type_key: &str,
        schema: RecordTypeSchema,
    ) -> StrataResult<RecordTypeSnapshot> {
        let tenant = Self::tenant(ctx);
        let stored = self
            .snapshots
            .entry((tenant, change_id, record_type_key.to_string()))
            .or_insert_with(|| {
                self.stats.snapshot_creates.fetch_add(1, Ordering::SeqCst);
                RecordTypeSnapshot {
                    id: SnapshotId::new(),
                    tenant_id: tenant,
                    change_id,
                    record_type_key: record_type_key.to_string(),
                    schema,
                    created_at: Utc::now(),
                }
            });
        Ok(stored.clone())
    }
}

#[async_trait::async_trait]
impl EnvironmentStore for InMemoryRepository {
    async fn get_environment(
        &self,
        ctx: &RequestContext,
        id: EnvironmentId,
    ) -> StrataResult<Option<Environment>> {
        Ok(self
            .environments
            .get(&(Self::tenant(ctx), id))
            .map(|e| e.clone()))
    }

    async fn list_environment_package_installs(
        &self,
        ctx: &RequestContext,
        environment_id: EnvironmentId,
    ) -> StrataResult<Vec<PackageInstall>> {
        Ok(self
            .installs
            .get(&(Self::tenant(ctx), environment_id))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn promote_environment_packages(
        &self,
        ctx: &RequestContext,
        from: EnvironmentId,
        to: EnvironmentId,
        package_keys: &[String],
    ) -> StrataResult<Vec<PromotedPackage>> {
        let tenant = Self::tenant(ctx);
        let source: Vec<PackageInstall> = {
            let installs = self
                .installs
                .get(&(tenant, from))
                .ok_or_else(|| StrataError::not_found("environment installs", from))?;
            package_keys
                .iter()
                .map(|key| {
                    installs
                        .get(key)
                        .cloned()
                        .ok_or_else(|| StrataError::not_found("package install", key))
                })
                .collect::<StrataResult<_>>()?
        };

        let now = Utc::now();
        let mut target = self.installs.entry((tenant, to)).or_default();
        let promoted = source
            .into_iter()
            .map(|mut install| {
                install.environment_id = to;
                install.installed_at = now;
                let promoted = PromotedPackage {
                    package_key: install.package_key.clone(),
                    version: install.version.clone(),
                };
                target.insert(install.package_key.clone(), install);
                promoted
            })
            .collect();
        Ok(promoted)
    }
}

#[async_trait::async_trait]
impl PromotionStore for InMemoryRepository {
    async fn create_promotion_intent(
        &self,
        ctx: &RequestContext,
        mut intent: PromotionIntent,
    ) -> StrataResult<PromotionIntent> {
        intent.tenant_id = Self::tenant(ctx);
        self.intents.insert((intent.tenant_id, intent.id), intent.clone());
        Ok(intent)
    }

    async fn get_promotion_intent(
        &self,
        ctx: &RequestContext,
        id: PromotionIntentId,
    ) -> StrataResult<Option<PromotionIntent>> {
        Ok(self.intents.get(&(Self::tenant(ctx), id)).map(|i| i.clone()))
    }

    async fn update_promotion_intent(
        &self,
        ctx: &RequestContext,
        mut intent: PromotionIntent,
    ) -> StrataResult<PromotionIntent> {
        let key = (Self::tenant(ctx), intent.id);
        let mut entry = self
            .intents
            .get_mut(&key)
            .ok_or_else(|| StrataError::not_found("promotion intent", intent.id))?;
        intent.tenant_id = key.0;
        intent.updated_at = Utc::now();
        *entry = intent.clone();
        Ok(intent)
    }

    async fn list_promotion_intents(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> StrataResult<Vec<PromotionIntent>> {
        let tenant = Self::tenant(ctx);
        let mut out: Vec<PromotionIntent> = self
            .intents
            .iter()
            .filter(|e| e.key().0 == tenant && e.project_id == project_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
